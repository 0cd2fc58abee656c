//! Pointer pixels <-> fractional page coordinates.
//!
//! Fractions are stored relative to the *unrotated* page box with the origin at
//! the top-left corner, so a stored shape stays put across zoom and rotation.
//! Pixel positions are relative to the page's rendered box as currently shown.

use doc_model::{FracPoint, FracRect};

/// Rendered size of a page at the moment of a gesture, after zoom and rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageExtent {
    pub width_px: f32,
    pub height_px: f32,
}

impl PageExtent {
    pub const fn new(width_px: f32, height_px: f32) -> Self {
        Self { width_px, height_px }
    }

    pub fn is_empty(&self) -> bool {
        self.width_px <= 0.0 || self.height_px <= 0.0
    }
}

/// Plain division by the rendered size. A zero-sized axis maps to 0.
pub fn to_fraction(x_px: f32, y_px: f32, extent: PageExtent) -> FracPoint {
    FracPoint {
        x: if extent.width_px > 0.0 { x_px / extent.width_px } else { 0.0 },
        y: if extent.height_px > 0.0 { y_px / extent.height_px } else { 0.0 },
    }
}

pub fn to_pixels(point: FracPoint, extent: PageExtent) -> (f32, f32) {
    (point.x * extent.width_px, point.y * extent.height_px)
}

/// Maps a fraction of the unrotated page to a fraction of the view rotated
/// clockwise by `rotation` degrees.
pub fn rotate_fraction(point: FracPoint, rotation: u16) -> FracPoint {
    let FracPoint { x, y } = point;
    match rotation % 360 {
        90 => FracPoint::new(1.0 - y, x),
        180 => FracPoint::new(1.0 - x, 1.0 - y),
        270 => FracPoint::new(y, 1.0 - x),
        _ => point,
    }
}

pub fn unrotate_fraction(point: FracPoint, rotation: u16) -> FracPoint {
    let FracPoint { x, y } = point;
    match rotation % 360 {
        90 => FracPoint::new(y, 1.0 - x),
        180 => FracPoint::new(1.0 - x, 1.0 - y),
        270 => FracPoint::new(1.0 - y, x),
        _ => point,
    }
}

/// Converts between a page's on-screen pixels and stored fractions for one
/// (extent, rotation) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub extent: PageExtent,
    pub rotation: u16,
}

impl Normalizer {
    pub fn new(extent: PageExtent, rotation: u16) -> Self {
        Self { extent, rotation }
    }

    pub fn to_fraction(&self, x_px: f32, y_px: f32) -> FracPoint {
        unrotate_fraction(to_fraction(x_px, y_px, self.extent), self.rotation)
    }

    pub fn to_pixels(&self, point: FracPoint) -> (f32, f32) {
        to_pixels(rotate_fraction(point, self.rotation), self.extent)
    }

    /// Returns the stored rectangle spanned by two on-screen corners.
    pub fn rect_to_fraction(&self, a_px: (f32, f32), b_px: (f32, f32)) -> FracRect {
        FracRect::from_corners(self.to_fraction(a_px.0, a_px.1), self.to_fraction(b_px.0, b_px.1))
    }

    /// Returns the on-screen `(x, y, width, height)` of a stored rectangle.
    pub fn rect_to_pixels(&self, rect: FracRect) -> (f32, f32, f32, f32) {
        let (ax, ay) = self.to_pixels(FracPoint::new(rect.x, rect.y));
        let (bx, by) = self.to_pixels(FracPoint::new(rect.x + rect.width, rect.y + rect.height));
        (ax.min(bx), ay.min(by), (ax - bx).abs(), (ay - by).abs())
    }
}

/// Converts a stored fraction to PDF user space of a page whose box starts at
/// `(origin_x, origin_y)`. PDF y grows upward, so the axis is flipped.
pub fn fraction_to_page_space(
    point: FracPoint,
    origin: (f32, f32),
    page_width: f32,
    page_height: f32,
) -> (f32, f32) {
    (origin.0 + point.x * page_width, origin.1 + page_height - point.y * page_height)
}

pub fn page_space_to_fraction(
    x: f32,
    y: f32,
    origin: (f32, f32),
    page_width: f32,
    page_height: f32,
) -> FracPoint {
    FracPoint {
        x: if page_width > 0.0 { (x - origin.0) / page_width } else { 0.0 },
        y: if page_height > 0.0 { (page_height - (y - origin.1)) / page_height } else { 0.0 },
    }
}
