//! Configuration layer providing clean separation between CLI arguments and internal configuration.
//!
//! - `GlobalArgs` / `AnalyzeCommand` / `ClassifyCommand`: what clap parses
//! - `BaseConfig`: options shared by every batch run (sources, output placement, strictness)
//! - `AnalysisConfig`: everything the lesion engine itself needs
//! - `AnalyzeConfig`: the two combined for the `analyze` command

use crate::annotation::AnnotationStyle;
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a detector class id means to the lesion engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DetectionRole {
    Leaf,
    Lesion,
    Ignored,
}

/// Mapping from detector class ids to leaf/lesion roles.
///
/// Lesion classes form an inclusive contiguous range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelScheme {
    pub leaf_class: u32,
    pub lesion_class_min: u32,
    pub lesion_class_max: u32,
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self {
            leaf_class: 4,
            lesion_class_min: 1,
            lesion_class_max: 3,
        }
    }
}

impl LabelScheme {
    pub fn new(leaf_class: u32, lesion_classes: (u32, u32)) -> Result<Self, String> {
        let (min, max) = lesion_classes;
        if min > max {
            return Err(format!("Lesion class range is empty: {min}-{max}"));
        }
        if (min..=max).contains(&leaf_class) {
            return Err(format!(
                "Leaf class {leaf_class} must not fall inside the lesion range {min}-{max}"
            ));
        }
        Ok(Self {
            leaf_class,
            lesion_class_min: min,
            lesion_class_max: max,
        })
    }

    pub fn role(&self, class_id: u32) -> DetectionRole {
        if class_id == self.leaf_class {
            DetectionRole::Leaf
        } else if (self.lesion_class_min..=self.lesion_class_max).contains(&class_id) {
            DetectionRole::Lesion
        } else {
            DetectionRole::Ignored
        }
    }
}

/// Parse a lesion class range like "1-3" or a single class like "2"
pub fn parse_class_range(s: &str) -> Result<(u32, u32), String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid class id: '{part}'"))
    };
    match s.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (parse(lo)?, parse(hi)?);
            if lo > hi {
                return Err(format!("Range start {lo} is greater than end {hi}"));
            }
            Ok((lo, hi))
        }
        None => {
            let class = parse(s)?;
            Ok((class, class))
        }
    }
}

/// Parse JPEG quality (must be between 1 and 100)
pub fn parse_jpeg_quality(s: &str) -> Result<u8, String> {
    let val = s
        .parse::<u8>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(1..=100).contains(&val) {
        return Err(format!("Must be between 1 and 100, got {val}"));
    }
    Ok(val)
}

/// Parse a ratio value (must be between 0.0 and 1.0)
pub fn parse_ratio(s: &str) -> Result<f64, String> {
    let val = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(0.0..=1.0).contains(&val) {
        return Err(format!("Must be between 0.0 and 1.0, got {val}"));
    }
    Ok(val)
}

/// Global CLI arguments that apply to all leafscan commands
#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Global output directory (overrides default placement next to input)
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Create metadata output file(s)
    #[arg(long, global = true)]
    pub metadata: bool,

    /// Verbosity level (-q/--quiet, -v/-vv/-vvv for info/debug/trace)
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// Use permissive mode (warn and continue instead of failing on bad inputs)
    #[arg(long, global = true)]
    pub permissive: bool,

    /// Disable colored output (also respects NO_COLOR and LEAFSCAN_NO_COLOR env vars)
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// CLI command for lesion analysis (only command-specific arguments)
#[derive(Parser, Debug, Clone)]
pub struct AnalyzeCommand {
    /// Path(s) to input images or directories. Supports glob patterns like *.jpg
    #[arg(value_name = "IMAGES_OR_DIRS", required = true)]
    pub sources: Vec<String>,

    /// Directory holding `<image stem>.json` detection files (defaults to the image's directory)
    #[arg(long)]
    pub detections_dir: Option<String>,

    /// Detector class id that marks a leaf
    #[arg(long, default_value = "4")]
    pub leaf_class: u32,

    /// Detector class ids that mark lesions, as an inclusive range ("1-3") or a single id
    #[arg(long, default_value = "1-3", value_parser = parse_class_range)]
    pub lesion_classes: (u32, u32),

    /// Font file (TTF/OTF) used for leaf labels; defaults to a system font when one is installed
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// JPEG quality of the annotated image (1-100)
    #[arg(long, default_value = "95", value_parser = parse_jpeg_quality)]
    pub jpeg_quality: u8,

    /// Do not write annotated images
    #[arg(long)]
    pub no_annotate: bool,

    /// Measure leaves of each image in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Write one JSON row per leaf (with severity tier) for the whole run
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,
}

/// CLI command for classifying a single (ratio, count) pair
#[derive(Parser, Debug, Clone)]
pub struct ClassifyCommand {
    /// Lesion area / leaf area (0.0-1.0)
    #[arg(long, value_parser = parse_ratio)]
    pub ratio: f64,

    /// Number of lesions on the leaf
    #[arg(long)]
    pub count: u32,
}

/// Base configuration common to all batch runs
#[derive(Debug, Clone, Serialize)]
pub struct BaseConfig {
    /// Input sources (images, directories or glob patterns)
    pub sources: Vec<String>,
    /// Optional output directory override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Whether to skip metadata generation
    pub skip_metadata: bool,
    /// Use strict mode (fail on the first bad input). Opposite of `--permissive`.
    pub strict: bool,
}

/// Everything the lesion engine needs for one image
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisConfig {
    pub labels: LabelScheme,
    pub style: AnnotationStyle,
    pub jpeg_quality: u8,
    /// Run the per-leaf measure pass on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            labels: LabelScheme::default(),
            style: AnnotationStyle::default(),
            jpeg_quality: 95,
            parallel: false,
        }
    }
}

/// Internal configuration for the `analyze` command
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeConfig {
    #[serde(skip)]
    pub base: BaseConfig,
    pub analysis: AnalysisConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
    pub annotate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_path: Option<PathBuf>,
}

impl From<GlobalArgs> for BaseConfig {
    fn from(global: GlobalArgs) -> Self {
        Self {
            sources: Vec::new(), // Sources come from command, not global args
            output_dir: global.output_dir,
            skip_metadata: !global.metadata,
            strict: !global.permissive,
        }
    }
}

impl AnalyzeConfig {
    /// Create configuration from global args and command-specific args
    pub fn from_args(global: GlobalArgs, cmd: AnalyzeCommand) -> Result<Self, String> {
        let labels = LabelScheme::new(cmd.leaf_class, cmd.lesion_classes)?;

        let mut base: BaseConfig = global.into();
        base.sources = cmd.sources;

        Ok(Self {
            base,
            analysis: AnalysisConfig {
                labels,
                style: AnnotationStyle::default(),
                jpeg_quality: cmd.jpeg_quality,
                parallel: cmd.parallel,
            },
            detections_dir: cmd.detections_dir,
            font_path: cmd.font,
            annotate: !cmd.no_annotate,
            summary_path: cmd.summary,
        })
    }
}
