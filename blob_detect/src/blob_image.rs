use image::{DynamicImage, GenericImageView, ImageError, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobImageError {
    #[error("Unrecognized image format: {0}")]
    UnknownFormat(ImageError),
    #[error("Failed to decode image: {0}")]
    Decode(ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(ImageError),
}

/// A decoded blob that remembers its encoding, so it is written back in the
/// format it arrived in.
pub struct BlobImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

impl BlobImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlobImageError> {
        let format = image::guess_format(bytes).map_err(BlobImageError::UnknownFormat)?;
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(BlobImageError::Decode)?;
        Ok(Self { image, format })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn encode(&self) -> Result<Vec<u8>, BlobImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, self.format)
            .map_err(BlobImageError::Encode)?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(8, 6, Rgb([255, 0, 0]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_png_round_trip_keeps_format() {
        let blob = BlobImage::from_bytes(&encoded(ImageFormat::Png)).unwrap();
        assert_eq!(blob.format, ImageFormat::Png);
        assert_eq!(blob.dimensions(), (8, 6));

        let bytes = blob.encode().unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_jpeg_keeps_format() {
        let blob = BlobImage::from_bytes(&encoded(ImageFormat::Jpeg)).unwrap();
        assert_eq!(blob.format, ImageFormat::Jpeg);

        let bytes = blob.encode().unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_unknown_format() {
        let result = BlobImage::from_bytes(b"this is not an image");
        assert!(matches!(result, Err(BlobImageError::UnknownFormat(_))));
    }

    #[test]
    fn test_truncated_image() {
        let mut bytes = encoded(ImageFormat::Png);
        bytes.truncate(bytes.len() / 2);

        let result = BlobImage::from_bytes(&bytes);
        assert!(matches!(result, Err(BlobImageError::Decode(_))));
    }
}
