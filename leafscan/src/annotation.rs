//! Drawing layer for lesion analysis.
//!
//! The `Annotator` owns the output image and is the only thing that writes to
//! it; leaves are drawn one at a time in index order.

use crate::lesion_analysis::LeafMeasurement;
use crate::mask::Mask;
use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::debug;
use serde::Serialize;
use std::path::Path;

/// Colours and sizes used when annotating leaves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationStyle {
    pub leaf_tint: [u8; 3],
    pub leaf_opacity: f32,
    pub lesion_tint: [u8; 3],
    pub lesion_opacity: f32,
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    pub label_scale: f32,
    pub caption_scale: f32,
    pub panel_color: [u8; 3],
    pub panel_opacity: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            leaf_tint: [0, 255, 0],
            leaf_opacity: 0.1,
            lesion_tint: [255, 0, 0],
            lesion_opacity: 0.3,
            box_color: [0, 230, 0],
            box_thickness: 3,
            label_scale: 40.0,
            caption_scale: 26.0,
            panel_color: [0, 0, 0],
            panel_opacity: 0.6,
        }
    }
}

/// Load a TTF/OTF font for leaf labels
pub fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read font file {}", path.display()))?;
    FontVec::try_from_vec(data)
        .map_err(|_| anyhow::anyhow!("Failed to parse font file: {}", path.display()))
}

/// Space between label text and its panel edge
const LABEL_PADDING: u32 = 4;

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// First parseable font from the usual system locations, if any
pub fn system_font() -> Option<FontVec> {
    for path in SYSTEM_FONT_PATHS {
        if let Ok(data) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(data) {
                debug!("Using system font {path}");
                return Some(font);
            }
        }
    }
    debug!("No system font found, labels are drawn as blank panels");
    None
}

/// Rendered text extent, or an estimate from the scale when there is no font
fn label_extent(font: Option<&FontVec>, scale: f32, text: &str) -> (u32, u32) {
    match font {
        Some(font) => text_size(PxScale::from(scale), font, text),
        None => (
            (text.chars().count() as f32 * scale * 0.5).ceil() as u32,
            (scale * 0.75).ceil() as u32,
        ),
    }
}

/// `out = alpha * color + (1 - alpha) * original`
fn blend_pixel(pixel: &mut Rgb<u8>, color: [u8; 3], alpha: f32) {
    for (channel, &tint) in pixel.0.iter_mut().zip(color.iter()) {
        let mixed = alpha * tint as f32 + (1.0 - alpha) * *channel as f32;
        *channel = mixed.round().clamp(0.0, 255.0) as u8;
    }
}

/// Blend `color` into every canvas pixel under a set cell of `mask`, with the
/// mask's top-left corner placed at `origin`.
pub fn blend_mask(
    canvas: &mut RgbImage,
    mask: &Mask,
    origin: (i32, i32),
    color: [u8; 3],
    alpha: f32,
) {
    let (w, h) = canvas.dimensions();
    for (mx, my) in mask.set_cells() {
        let x = origin.0 + mx as i32;
        let y = origin.1 + my as i32;
        if x < 0 || y < 0 || x as u32 >= w || y as u32 >= h {
            continue;
        }
        blend_pixel(canvas.get_pixel_mut(x as u32, y as u32), color, alpha);
    }
}

fn blend_rect(
    canvas: &mut RgbImage,
    origin: (i32, i32),
    size: (u32, u32),
    color: [u8; 3],
    alpha: f32,
) {
    let (x, y) = origin;
    let (width, height) = size;
    let (w, h) = canvas.dimensions();
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = ((x as i64 + width as i64).max(0) as u32).min(w);
    let y1 = ((y as i64 + height as i64).max(0) as u32).min(h);
    for py in y0..y1 {
        for px in x0..x1 {
            blend_pixel(canvas.get_pixel_mut(px, py), color, alpha);
        }
    }
}

/// Sequential compositor for one output image
pub struct Annotator<'a> {
    canvas: RgbImage,
    style: &'a AnnotationStyle,
    font: Option<&'a FontVec>,
}

impl<'a> Annotator<'a> {
    pub fn new(canvas: RgbImage, style: &'a AnnotationStyle, font: Option<&'a FontVec>) -> Self {
        Self {
            canvas,
            style,
            font,
        }
    }

    /// Tint the leaf and its lesions, then draw the box and labels.
    pub fn draw_leaf(&mut self, leaf: &LeafMeasurement) {
        let leaf_box = leaf.leaf_box;
        blend_mask(
            &mut self.canvas,
            &leaf.leaf_mask,
            (leaf_box.x1, leaf_box.y1),
            self.style.leaf_tint,
            self.style.leaf_opacity,
        );

        if !leaf.lesion_footprints.is_empty() {
            // Overlapping footprints are tinted once, not once per lesion
            let (w, h) = self.canvas.dimensions();
            let mut paint = Mask::empty(w, h);
            for footprint in &leaf.lesion_footprints {
                paint.union_at(
                    &footprint.mask,
                    footprint.region.x1.max(0) as u32,
                    footprint.region.y1.max(0) as u32,
                );
            }
            blend_mask(
                &mut self.canvas,
                &paint,
                (0, 0),
                self.style.lesion_tint,
                self.style.lesion_opacity,
            );
        }

        self.draw_box(leaf_box.x1, leaf_box.y1, leaf_box.width(), leaf_box.height());
        self.draw_labels(leaf);
    }

    fn draw_box(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let color = Rgb(self.style.box_color);
        let thickness = self.style.box_thickness as i32;
        for t in 0..thickness {
            // Centre the stroke on the box edge
            let offset = t - thickness / 2;
            let (w, h) = (width + 2 * offset, height + 2 * offset);
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(x - offset, y - offset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut self.canvas, rect, color);
        }
    }

    /// Draw `text` on a translucent panel with its top-left corner at `origin`.
    /// Without a font only the panel is drawn.
    fn draw_panel_text(&mut self, origin: (i32, i32), extent: (u32, u32), scale: f32, text: &str) {
        let (text_width, text_height) = extent;
        blend_rect(
            &mut self.canvas,
            origin,
            (text_width + 2 * LABEL_PADDING, text_height + 2 * LABEL_PADDING),
            self.style.panel_color,
            self.style.panel_opacity,
        );
        if let Some(font) = self.font {
            draw_text_mut(
                &mut self.canvas,
                Rgb(self.style.box_color),
                origin.0 + LABEL_PADDING as i32,
                origin.1 + LABEL_PADDING as i32,
                PxScale::from(scale),
                font,
                text,
            );
        }
    }

    fn draw_labels(&mut self, leaf: &LeafMeasurement) {
        let report = &leaf.report;
        let leaf_box = leaf.leaf_box;

        let index_text = format!("{}", report.leaf_index);
        let scale = self.style.label_scale;
        let extent = label_extent(self.font, scale, &index_text);
        let index_y = (leaf_box.y1 - 10 - extent.1 as i32 - 2 * LABEL_PADDING as i32).max(0);
        self.draw_panel_text((leaf_box.x1, index_y), extent, scale, &index_text);

        let caption = format!(
            "Lesion ratio: {:.2}%, count: {}, avg_gray: {:.2}",
            report.lesion_ratio * 100.0,
            report.lesion_count,
            report.avg_gray_value
        );
        let scale = self.style.caption_scale;
        let extent = label_extent(self.font, scale, &caption);
        let panel_height = (extent.1 + 2 * LABEL_PADDING) as i32;
        let max_y = self.canvas.height() as i32 - panel_height;
        let panel_y = (leaf_box.y2 + 5).min(max_y).max(0);
        self.draw_panel_text((leaf_box.x1, panel_y), extent, scale, &caption);
    }

    pub fn finish(self) -> RgbImage {
        self.canvas
    }
}

/// Encode an RGB image as JPEG bytes
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}
