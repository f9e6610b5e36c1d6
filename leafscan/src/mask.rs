//! Binary raster masks backed by `GrayImage`.
//!
//! Set cells hold 255, clear cells 0. These are the only raster operations the
//! lesion engine needs: filled ellipses, AND/OR, counting, resampling and a
//! masked mean over a grayscale image.

use crate::geometry::PixelRect;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_ellipse_mut;

const SET: Luma<u8> = Luma([255]);

#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pixels: GrayImage,
}

impl Mask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
    }

    /// Filled axis-aligned ellipse. A semi-axis of zero or less yields an empty mask.
    pub fn ellipse(width: u32, height: u32, center: (i32, i32), semi_axes: (i32, i32)) -> Self {
        let mut mask = Self::empty(width, height);
        let (a, b) = semi_axes;
        if width == 0 || height == 0 || a <= 0 || b <= 0 {
            return mask;
        }
        draw_filled_ellipse_mut(&mut mask.pixels, center, a, b, SET);
        mask
    }

    /// Ellipse centred in a `width × height` grid, each semi-axis shortened by `inset`.
    pub fn inscribed_ellipse(width: u32, height: u32, inset: i32) -> Self {
        let (cx, cy) = ((width / 2) as i32, (height / 2) as i32);
        Self::ellipse(
            width,
            height,
            (cx, cy),
            ((cx - inset).max(0), (cy - inset).max(0)),
        )
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y)[0] != 0
    }

    pub fn count_nonzero(&self) -> u32 {
        self.pixels.iter().filter(|&&v| v != 0).count() as u32
    }

    /// Coordinates of every set cell in row-major order.
    pub fn set_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pixels
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] != 0)
            .map(|(x, y, _)| (x, y))
    }

    /// OR `other` into `self` with its top-left corner at `(x, y)`; cells outside are dropped.
    pub fn union_at(&mut self, other: &Mask, x: u32, y: u32) {
        let (w, h) = self.dimensions();
        for (ox, oy) in other.set_cells() {
            let (tx, ty) = (x + ox, y + oy);
            if tx < w && ty < h {
                self.pixels.put_pixel(tx, ty, SET);
            }
        }
    }

    /// In-place AND with a mask of the same dimensions.
    pub fn intersect(&mut self, other: &Mask) {
        debug_assert_eq!(self.dimensions(), other.dimensions());
        for (cell, &rhs) in self.pixels.iter_mut().zip(other.pixels.iter()) {
            *cell &= rhs;
        }
    }

    /// Bilinear resample to `width × height`; any nonzero sample counts as set.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == 0 || height == 0 || self.width() == 0 || self.height() == 0 {
            return Self::empty(width, height);
        }
        let mut pixels = imageops::resize(&self.pixels, width, height, FilterType::Triangle);
        for cell in pixels.iter_mut() {
            if *cell != 0 {
                *cell = 255;
            }
        }
        Self { pixels }
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }
}

/// Mean of `gray` over the set cells of `mask`, where `mask` covers `region`.
///
/// Returns `None` when no set cell lands inside the image.
pub fn masked_mean(gray: &GrayImage, region: &PixelRect, mask: &Mask) -> Option<f64> {
    let (gw, gh) = gray.dimensions();
    let mut sum = 0u64;
    let mut count = 0u64;
    for (x, y) in mask.set_cells() {
        let gx = region.x1 + x as i32;
        let gy = region.y1 + y as i32;
        if gx < 0 || gy < 0 || gx as u32 >= gw || gy as u32 >= gh {
            continue;
        }
        sum += gray.get_pixel(gx as u32, gy as u32)[0] as u64;
        count += 1;
    }
    (count > 0).then(|| sum as f64 / count as f64)
}
