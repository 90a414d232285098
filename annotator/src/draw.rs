use crate::detection::{Detection, PixelRect};
use crate::style::AnnotationStyle;
use image::{DynamicImage, GenericImageView, Rgba};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};

/// Draws every detection whose probability is strictly above `threshold` onto
/// `image`, in input order, and returns how many were drawn.
///
/// Each box gets an outline with its edges on `left`/`left + width` and
/// `top`/`top + height`, plus its tag name anchored at the top-left corner.
/// Anything falling outside the canvas is clipped; boxes are neither clamped
/// nor rejected, so inverted boxes are drawn as-is.
pub fn annotate(
    image: &mut DynamicImage,
    detections: &[Detection],
    threshold: f64,
    style: &AnnotationStyle,
) -> usize {
    let (width, height) = image.dimensions();
    let mut drawn = 0;

    for detection in detections.iter().filter(|d| d.is_above(threshold)) {
        let rect = PixelRect::from_proportional(&detection.bounding_box, width, height);
        tracing::debug!(
            "Drawing {} ({:.3}) at ({}, {}, {}, {})",
            detection.tag_name,
            detection.probability,
            rect.left,
            rect.top,
            rect.width,
            rect.height
        );
        draw_detection(image, &rect, &detection.tag_name, style);
        drawn += 1;
    }

    drawn
}

pub fn annotate_with_default_style(image: &mut DynamicImage, detections: &[Detection]) -> usize {
    annotate(
        image,
        detections,
        crate::style::DEFAULT_THRESHOLD,
        &AnnotationStyle::default(),
    )
}

fn draw_detection(
    image: &mut DynamicImage,
    rect: &PixelRect,
    label: &str,
    style: &AnnotationStyle,
) {
    draw_outline(image, rect, style.stroke_color, style.stroke_width);

    if let Some(font) = &style.font {
        draw_text_mut(
            image,
            style.text_color,
            rect.left,
            rect.top,
            style.font_size,
            font,
            label,
        );
    }
}

/// Pen-style outline: `stroke_width` one-pixel outlines centred on the edge.
fn draw_outline(image: &mut DynamicImage, rect: &PixelRect, color: Rgba<u8>, stroke_width: u32) {
    let stroke_width = i64::from(stroke_width.max(1));
    let left = i64::from(rect.left);
    let top = i64::from(rect.top);
    let right = left + i64::from(rect.width);
    let bottom = top + i64::from(rect.height);

    for offset in -(stroke_width / 2)..=(stroke_width - 1 - stroke_width / 2) {
        let (x0, y0) = (left - offset, top - offset);
        let (x1, y1) = (right + offset, bottom + offset);

        draw_horizontal(image, y0, x0, x1, color);
        draw_horizontal(image, y1, x0, x1, color);
        draw_vertical(image, x0, y0, y1, color);
        draw_vertical(image, x1, y0, y1, color);
    }
}

fn draw_horizontal(image: &mut DynamicImage, y: i64, xa: i64, xb: i64, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if y < 0 || y >= i64::from(height) {
        return;
    }
    if let Some((lo, hi)) = clip_span(xa, xb, width) {
        draw_line_segment_mut(image, (lo, y as f32), (hi, y as f32), color);
    }
}

fn draw_vertical(image: &mut DynamicImage, x: i64, ya: i64, yb: i64, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if x < 0 || x >= i64::from(width) {
        return;
    }
    if let Some((lo, hi)) = clip_span(ya, yb, height) {
        draw_line_segment_mut(image, (x as f32, lo), (x as f32, hi), color);
    }
}

/// Restricts the inclusive span `a..=b` (in either order) to `0..len`.
fn clip_span(a: i64, b: i64, len: u32) -> Option<(f32, f32)> {
    let lo = a.min(b).max(0);
    let hi = a.max(b).min(i64::from(len) - 1);
    (lo <= hi).then_some((lo as f32, hi as f32))
}
