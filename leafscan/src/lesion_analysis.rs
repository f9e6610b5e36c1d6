//! Lesion quantification engine.
//!
//! Analysis runs in two passes. The measure pass computes leaf and lesion
//! masks, areas and gray samples for every leaf independently and may run on
//! the rayon pool. The annotate pass then draws each leaf onto the output image
//! strictly in leaf index order.

use crate::annotation::{encode_jpeg, system_font, Annotator};
use crate::config::{AnalysisConfig, DetectionRole};
use crate::detection_obj::Detection;
use crate::error::AnalysisError;
use crate::geometry::PixelRect;
use crate::mask::{masked_mean, Mask};
use ab_glyph::FontVec;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Pixels trimmed from each semi-axis of the leaf ellipse
const LEAF_MARGIN: i32 = 2;

/// Per-leaf measurement, serialized as-is into metadata and exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafLesionReport {
    /// 0-based position among leaf detections, in input order
    pub leaf_index: usize,
    pub leaf_area: u32,
    pub lesion_area: u32,
    /// `lesion_area / leaf_area`, rounded to 4 decimals
    pub lesion_ratio: f64,
    /// Lesion boxes strictly overlapping the leaf box
    pub lesion_count: u32,
    /// Mean of the per-lesion mean gray values, rounded to 4 decimals
    pub avg_gray_value: f64,
}

/// Where a lesion was sampled in the source image.
#[derive(Debug, Clone, PartialEq)]
pub struct LesionFootprint {
    /// Lesion box clamped to the image
    pub region: PixelRect,
    /// Lesion ellipse resampled to `region`'s size
    pub mask: Mask,
}

/// Output of the measure pass for one leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafMeasurement {
    pub report: LeafLesionReport,
    /// Leaf box after truncation and clamping to the image
    pub leaf_box: PixelRect,
    /// Leaf ellipse in leaf-local coordinates
    pub leaf_mask: Mask,
    /// Combined lesion mask: the lesion overlay ANDed with `leaf_mask`,
    /// leaf-local. Its nonzero count is `report.lesion_area`.
    pub lesion_mask: Mask,
    pub lesion_footprints: Vec<LesionFootprint>,
}

pub fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

/// Grayscale with ITU-R BT.601 luma weights.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Measure one leaf against every lesion box.
///
/// `leaf_box` must already be clamped to `gray`'s bounds. Never fails:
/// degenerate boxes produce empty masks and zero ratios.
pub fn measure_leaf(
    leaf_index: usize,
    leaf_box: PixelRect,
    lesions: &[PixelRect],
    gray: &GrayImage,
) -> LeafMeasurement {
    let (image_width, image_height) = gray.dimensions();
    let (lw, lh) = (leaf_box.width() as u32, leaf_box.height() as u32);

    let leaf_mask = Mask::inscribed_ellipse(lw, lh, LEAF_MARGIN);
    let leaf_area = leaf_mask.count_nonzero();

    let mut overlay = Mask::empty(lw, lh);
    let mut footprints = Vec::new();
    let mut gray_samples = Vec::new();
    let mut lesion_count = 0u32;

    for lesion in lesions.iter().filter(|lesion| leaf_box.overlaps(lesion)) {
        lesion_count += 1;

        let local = lesion.local_to(&leaf_box);
        if local.is_empty() {
            trace!("Leaf {leaf_index}: lesion {lesion:?} clips to nothing");
            continue;
        }
        let shape = Mask::inscribed_ellipse(local.width() as u32, local.height() as u32, 0);
        overlay.union_at(&shape, local.x1 as u32, local.y1 as u32);

        let region = lesion.clamp_to(image_width, image_height);
        if region.is_empty() {
            continue;
        }
        let footprint = shape.resized(region.width() as u32, region.height() as u32);
        match masked_mean(gray, &region, &footprint) {
            Some(mean) => gray_samples.push(mean),
            None => trace!("Leaf {leaf_index}: lesion {lesion:?} has no gray sample"),
        }
        footprints.push(LesionFootprint {
            region,
            mask: footprint,
        });
    }

    overlay.intersect(&leaf_mask);
    let lesion_area = overlay.count_nonzero();

    let lesion_ratio = if leaf_area == 0 {
        0.0
    } else {
        round4(lesion_area as f64 / leaf_area as f64)
    };
    let avg_gray_value = if gray_samples.is_empty() {
        0.0
    } else {
        round4(gray_samples.iter().sum::<f64>() / gray_samples.len() as f64)
    };

    debug!(
        "Leaf {leaf_index}: area={leaf_area}, lesion_area={lesion_area}, ratio={lesion_ratio}, count={lesion_count}, avg_gray={avg_gray_value}"
    );

    LeafMeasurement {
        report: LeafLesionReport {
            leaf_index,
            leaf_area,
            lesion_area,
            lesion_ratio,
            lesion_count,
            avg_gray_value,
        },
        leaf_box,
        leaf_mask,
        lesion_mask: overlay,
        lesion_footprints: footprints,
    }
}

/// Measure pass over all leaves; output order always follows `leaves`.
pub fn measure_leaves(
    leaves: &[PixelRect],
    lesions: &[PixelRect],
    gray: &GrayImage,
    parallel: bool,
) -> Vec<LeafMeasurement> {
    if parallel {
        leaves
            .par_iter()
            .enumerate()
            .map(|(index, leaf)| measure_leaf(index, *leaf, lesions, gray))
            .collect()
    } else {
        leaves
            .iter()
            .enumerate()
            .map(|(index, leaf)| measure_leaf(index, *leaf, lesions, gray))
            .collect()
    }
}

/// Result of analysing one image
#[derive(Debug, Clone)]
pub struct LesionAnalysis {
    pub measurements: Vec<LeafMeasurement>,
    pub annotated_jpeg: Vec<u8>,
}

impl LesionAnalysis {
    pub fn reports(&self) -> Vec<LeafLesionReport> {
        self.measurements.iter().map(|m| m.report.clone()).collect()
    }

    pub fn into_parts(self) -> (Vec<LeafLesionReport>, Vec<u8>) {
        let reports = self.measurements.into_iter().map(|m| m.report).collect();
        (reports, self.annotated_jpeg)
    }
}

/// Lesion engine bound to a label scheme, style and optional label font.
pub struct LesionAnalyzer {
    config: AnalysisConfig,
    font: Option<FontVec>,
}

impl LesionAnalyzer {
    /// Labels use the first system font found; see [`with_font`](Self::with_font).
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            font: system_font(),
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Validate the raster and return it as RGB.
    fn rgb_source(image: Option<&DynamicImage>) -> Result<RgbImage, AnalysisError> {
        let image = image.ok_or_else(|| AnalysisError::invalid_image("no image provided"))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(AnalysisError::invalid_image(format!(
                "image has zero size ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(image.to_rgb8())
    }

    /// Split detections into clamped leaf boxes and raw lesion boxes.
    fn partition(
        &self,
        detections: &[Detection],
        width: u32,
        height: u32,
    ) -> (Vec<PixelRect>, Vec<PixelRect>) {
        let mut leaves = Vec::new();
        let mut lesions = Vec::new();
        for detection in detections {
            match self.config.labels.role(detection.class_id) {
                DetectionRole::Leaf => {
                    leaves.push(PixelRect::from_detection(detection).clamp_to(width, height))
                }
                DetectionRole::Lesion => lesions.push(PixelRect::from_detection(detection)),
                DetectionRole::Ignored => {
                    trace!("Ignoring detection {} of class {}", detection.id, detection.class_id)
                }
            }
        }
        (leaves, lesions)
    }

    fn measure_rgb(&self, detections: &[Detection], rgb: &RgbImage) -> Vec<LeafMeasurement> {
        let (leaves, lesions) = self.partition(detections, rgb.width(), rgb.height());
        debug!(
            "Measuring {} leaves against {} lesions ({}x{})",
            leaves.len(),
            lesions.len(),
            rgb.width(),
            rgb.height()
        );
        let gray = to_gray(rgb);
        measure_leaves(&leaves, &lesions, &gray, self.config.parallel)
    }

    /// Measure pass only, without drawing or encoding.
    pub fn measure(
        &self,
        detections: &[Detection],
        image: Option<&DynamicImage>,
    ) -> Result<Vec<LeafMeasurement>, AnalysisError> {
        let rgb = Self::rgb_source(image)?;
        Ok(self.measure_rgb(detections, &rgb))
    }

    /// Measure every leaf, draw them in index order and encode the result as JPEG.
    pub fn analyze(
        &self,
        detections: &[Detection],
        image: Option<&DynamicImage>,
    ) -> Result<LesionAnalysis, AnalysisError> {
        let rgb = Self::rgb_source(image)?;
        let measurements = self.measure_rgb(detections, &rgb);

        let mut annotator = Annotator::new(rgb, &self.config.style, self.font.as_ref());
        for measurement in &measurements {
            annotator.draw_leaf(measurement);
        }
        let annotated_jpeg = encode_jpeg(&annotator.finish(), self.config.jpeg_quality)
            .map_err(AnalysisError::Encode)?;

        Ok(LesionAnalysis {
            measurements,
            annotated_jpeg,
        })
    }

    /// Same as [`analyze`](Self::analyze) for an encoded image.
    pub fn analyze_encoded(
        &self,
        detections: &[Detection],
        bytes: &[u8],
    ) -> Result<LesionAnalysis, AnalysisError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| AnalysisError::invalid_image(format!("cannot decode image: {e}")))?;
        self.analyze(detections, Some(&image))
    }
}

/// Analyse one image with the default label scheme and style.
pub fn analyze(
    detections: &[Detection],
    image: Option<&DynamicImage>,
) -> Result<(Vec<LeafLesionReport>, Vec<u8>), AnalysisError> {
    let analyzer = LesionAnalyzer::new(AnalysisConfig::default());
    Ok(analyzer.analyze(detections, image)?.into_parts())
}
