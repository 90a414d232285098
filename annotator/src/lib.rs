mod detection;
mod draw;
mod style;

pub use detection::{BoundingBox, Detection, PixelRect};
pub use draw::{annotate, annotate_with_default_style};
pub use style::{load_font, AnnotationStyle, FontError, DEFAULT_THRESHOLD};

pub use ab_glyph::FontArc;
pub use image::Rgba;
