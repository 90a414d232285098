use ab_glyph::FontArc;
use image::Rgba;
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.3;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// 12pt at 96 dpi.
const DEFAULT_FONT_SIZE: f32 = 16.0;

const DEFAULT_STROKE_WIDTH: u32 = 3;

const SYSTEM_FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum FontError {
    #[error("Failed to read font file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse font file {0}")]
    Parse(String),
}

/// How boxes and labels are painted.
///
/// Without a font the labels are skipped and only the rectangles are drawn.
#[derive(Clone)]
pub struct AnnotationStyle {
    pub stroke_color: Rgba<u8>,
    pub stroke_width: u32,
    pub text_color: Rgba<u8>,
    pub font: Option<FontArc>,
    pub font_size: f32,
}

impl fmt::Debug for AnnotationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationStyle")
            .field("stroke_color", &self.stroke_color)
            .field("stroke_width", &self.stroke_width)
            .field("text_color", &self.text_color)
            .field("font", &self.font.as_ref().map(|_| "<loaded>"))
            .field("font_size", &self.font_size)
            .finish()
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            stroke_color: RED,
            stroke_width: DEFAULT_STROKE_WIDTH,
            text_color: RED,
            font: None,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl AnnotationStyle {
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_font_path(self, font_path: &Path) -> Result<Self, FontError> {
        Ok(self.with_font(load_font(font_path)?))
    }

    /// Tries a handful of well-known font locations and keeps the style
    /// font-less when none of them can be loaded.
    pub fn with_system_font(self) -> Self {
        for path in SYSTEM_FONT_PATHS {
            if let Ok(font) = load_font(Path::new(path)) {
                tracing::info!("Loaded system font: {}", path);
                return self.with_font(font);
            }
        }

        tracing::debug!("No system font found, labels will be skipped");
        self
    }
}

pub fn load_font(font_path: &Path) -> Result<FontArc, FontError> {
    let font_data = std::fs::read(font_path).map_err(|source| FontError::Read {
        path: font_path.display().to_string(),
        source,
    })?;
    FontArc::try_from_vec(font_data)
        .map_err(|_| FontError::Parse(font_path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_style() {
        let style = AnnotationStyle::default();
        assert_eq!(style.stroke_color, Rgba([255, 0, 0, 255]));
        assert_eq!(style.stroke_width, 3);
        assert_eq!(style.text_color, style.stroke_color);
        assert!(style.font.is_none());
    }

    #[test]
    fn test_load_font_missing_file() {
        let result = load_font(Path::new("./does/not/exist.ttf"));
        assert!(matches!(result, Err(FontError::Read { .. })));
    }

    #[test]
    fn test_load_font_invalid_data() {
        let path = std::env::temp_dir().join("annotator_invalid_font.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();

        let result = load_font(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(FontError::Parse(_))));
    }
}
