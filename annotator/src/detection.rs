use serde::Deserialize;

/// Proportional bounding box, each value a fraction of the image's width or
/// height with the origin at the top-left corner.
///
/// Values are taken as received; nothing guarantees they lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One predicted object instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub probability: f64,
    pub bounding_box: BoundingBox,
    pub tag_name: String,
}

impl Detection {
    pub fn new(tag_name: impl Into<String>, probability: f64, bounding_box: BoundingBox) -> Self {
        Self {
            probability,
            bounding_box,
            tag_name: tag_name.into(),
        }
    }

    /// Strictly above: a detection sitting exactly on the threshold is dropped.
    pub fn is_above(&self, threshold: f64) -> bool {
        self.probability > threshold
    }
}

/// Absolute rectangle in pixels. May be negative or extend past the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Scales a proportional box to the image, rounding to nearest with ties
    /// going to the even pixel.
    pub fn from_proportional(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Self {
        let w = f64::from(image_width);
        let h = f64::from(image_height);
        Self {
            left: to_pixel(bbox.left * w),
            top: to_pixel(bbox.top * h),
            width: to_pixel(bbox.width * w),
            height: to_pixel(bbox.height * h),
        }
    }

    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }
}

// `as` saturates on overflow and maps NaN to 0.
fn to_pixel(value: f64) -> i32 {
    value.round_ties_even() as i32
}
