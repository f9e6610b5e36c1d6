//! Integer pixel rectangles and the rectangle tests the lesion engine relies on.

use crate::detection_obj::Detection;
use serde::Serialize;

/// Half-open pixel rectangle `[x1, x2) × [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl PixelRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Truncates the detector's float coordinates toward zero.
    pub fn from_detection(detection: &Detection) -> Self {
        Self::new(
            detection.x1() as i32,
            detection.y1() as i32,
            detection.x2() as i32,
            detection.y2() as i32,
        )
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Strict intersection test: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &PixelRect) -> bool {
        !(other.x1 >= self.x2 || other.x2 <= self.x1 || other.y1 >= self.y2 || other.y2 <= self.y1)
    }

    /// Clamp both corners into `[0, width] × [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self::new(
            self.x1.clamp(0, w),
            self.y1.clamp(0, h),
            self.x2.clamp(0, w),
            self.y2.clamp(0, h),
        )
    }

    /// Express `self` in the local coordinates of `frame`, clipped to the frame.
    ///
    /// The result may be empty (or inverted, which `width`/`height` report as 0)
    /// when `self` only grazes the frame. Coordinates far outside the `i32`
    /// range saturate instead of wrapping.
    pub fn local_to(&self, frame: &PixelRect) -> Self {
        let (fw, fh) = (frame.width(), frame.height());
        Self::new(
            self.x1.saturating_sub(frame.x1).max(0),
            self.y1.saturating_sub(frame.y1).max(0),
            self.x2.saturating_sub(frame.x1).min(fw),
            self.y2.saturating_sub(frame.y1).min(fh),
        )
    }
}
