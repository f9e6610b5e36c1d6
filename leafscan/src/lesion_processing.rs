//! Batch runner for the `analyze` command.
//!
//! Resolves sources to images, pairs each image with its detections file, runs
//! the lesion engine, and writes annotated images, metadata and the optional
//! summary export.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::annotation::load_font;
use crate::color_utils::{progress::create_batch_progress_bar, symbols};
use crate::config::AnalyzeConfig;
use crate::detection_obj::{count_by_class, load_detections};
use crate::export::{write_summary, LeafSummaryRow};
use crate::image_input::{collect_images_from_sources, ImageInputConfig};
use crate::lesion_analysis::{LeafLesionReport, LesionAnalyzer};
use crate::metadata::{
    collect_leafscan_env_vars, ExecutionContext, InputProcessing, LesionSections,
};
use crate::output_manager::OutputManager;
use crate::severity::SeverityTier;

/// Outcome of one image
#[derive(Debug, Clone)]
pub struct LesionResult {
    pub image_path: PathBuf,
    pub detections_path: PathBuf,
    pub annotated_path: Option<PathBuf>,
    pub image_size: (u32, u32),
    pub detection_counts: BTreeMap<String, usize>,
    pub reports: Vec<LeafLesionReport>,
    pub processing_time_ms: f64,
}

#[derive(Serialize)]
struct LeafEntry<'a> {
    #[serde(flatten)]
    report: &'a LeafLesionReport,
    severity: SeverityTier,
}

#[derive(Serialize)]
struct CoreResults<'a> {
    image_width: u32,
    image_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotated_image: Option<String>,
    leaf_count: usize,
    processing_time_ms: f64,
    detection_counts: &'a BTreeMap<String, usize>,
    leaves: Vec<LeafEntry<'a>>,
}

impl LesionResult {
    /// Human-readable summary for logging
    pub fn result_summary(&self) -> String {
        if self.reports.is_empty() {
            return "no leaves detected".to_string();
        }
        let leaves: Vec<String> = self
            .reports
            .iter()
            .map(|r| {
                format!(
                    "leaf {}: {:.2}% / {} lesions / tier {}",
                    r.leaf_index,
                    r.lesion_ratio * 100.0,
                    r.lesion_count,
                    r.severity()
                )
            })
            .collect();
        leaves.join("; ")
    }

    /// Core results for the `[lesions]` metadata section
    fn core_results(&self, output_manager: &OutputManager) -> Result<toml::Value> {
        let annotated_image = self
            .annotated_path
            .as_deref()
            .map(|path| output_manager.make_relative_to_metadata(path))
            .transpose()?;

        let core = CoreResults {
            image_width: self.image_size.0,
            image_height: self.image_size.1,
            annotated_image,
            leaf_count: self.reports.len(),
            processing_time_ms: self.processing_time_ms,
            detection_counts: &self.detection_counts,
            leaves: self
                .reports
                .iter()
                .map(|report| LeafEntry {
                    report,
                    severity: report.severity(),
                })
                .collect(),
        };
        toml::Value::try_from(core).context("Failed to serialize lesion results")
    }

    /// Summary rows keyed by the image's file stem
    pub fn summary_rows(&self) -> Vec<LeafSummaryRow> {
        let image = self
            .image_path
            .file_stem()
            .unwrap_or(self.image_path.as_os_str())
            .to_string_lossy();
        self.reports
            .iter()
            .map(|report| LeafSummaryRow::from_report(image.as_ref(), report))
            .collect()
    }
}

/// Totals for a whole `analyze` run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub rows: Vec<LeafSummaryRow>,
}

/// Shared run context recorded into every metadata file
struct RunContext {
    command_line: Vec<String>,
    source_types: Vec<String>,
    start_timestamp: DateTime<Utc>,
}

fn source_type(source: &str) -> &'static str {
    if Path::new(source).is_dir() {
        "directory"
    } else if source.contains(['*', '?', '[']) {
        "glob"
    } else {
        "file"
    }
}

/// Analyse every image named by the configured sources.
///
/// In strict mode the first failing image aborts the run; in permissive mode
/// failures are logged and counted.
pub fn run_lesion_analysis(config: AnalyzeConfig) -> Result<BatchSummary> {
    let run_start = Instant::now();
    let context = RunContext {
        command_line: std::env::args().collect(),
        source_types: config
            .base
            .sources
            .iter()
            .map(|s| source_type(s).to_string())
            .collect(),
        start_timestamp: Utc::now(),
    };

    let image_config = ImageInputConfig::from_strict_flag(config.base.strict);
    let image_files = collect_images_from_sources(&config.base.sources, &image_config)?;

    if image_files.is_empty() {
        warn!("No valid images found to process");
        return Ok(BatchSummary::default());
    }
    info!(
        "{}Found {} image(s) to process",
        symbols::resources_found(),
        image_files.len()
    );

    let mut analyzer = LesionAnalyzer::new(config.analysis.clone());
    if let Some(font_path) = &config.font_path {
        analyzer = analyzer.with_font(load_font(font_path)?);
    }

    let progress = create_batch_progress_bar(image_files.len());
    let mut summary = BatchSummary::default();

    for (index, image_path) in image_files.iter().enumerate() {
        if let Some(pb) = &progress {
            pb.set_message(image_path.display().to_string());
        }

        match process_single_image(&analyzer, image_path, &config) {
            Ok(result) => {
                summary.processed += 1;
                info!(
                    "{}Processed {} ({}/{}) in {:.1}ms",
                    symbols::completed_successfully(),
                    image_path.display(),
                    index + 1,
                    image_files.len(),
                    result.processing_time_ms
                );
                debug!("📊 {}", result.result_summary());

                if !config.base.skip_metadata {
                    save_metadata_for_file(&result, &config, &context)?;
                }
                summary.rows.extend(result.summary_rows());
            }
            Err(e) => {
                summary.failed += 1;
                if config.base.strict {
                    if let Some(pb) = &progress {
                        pb.finish_and_clear();
                    }
                    return Err(e.context(format!("Failed to process {}", image_path.display())));
                }
                warn!(
                    "{}Failed to process {} ({}/{}): {:#}",
                    symbols::warning(),
                    image_path.display(),
                    index + 1,
                    image_files.len(),
                    e
                );
            }
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    if let Some(summary_path) = &config.summary_path {
        write_summary(summary_path, &summary.rows)?;
        info!(
            "Wrote {} leaf row(s) to {}",
            summary.rows.len(),
            summary_path.display()
        );
    }

    let total_time = run_start.elapsed();
    if summary.failed == 0 {
        info!(
            "{}Processed {} image(s), {} leaves in {:.1}s",
            symbols::completed_successfully(),
            summary.processed,
            summary.rows.len(),
            total_time.as_secs_f64()
        );
    } else {
        warn!(
            "{}{} of {} images failed to process",
            symbols::completed_partially_successfully(),
            summary.failed,
            image_files.len()
        );
    }

    Ok(summary)
}

fn process_single_image(
    analyzer: &LesionAnalyzer,
    image_path: &Path,
    config: &AnalyzeConfig,
) -> Result<LesionResult> {
    let start = Instant::now();
    let output_manager = OutputManager::new(&config.base, image_path);

    let detections_path = output_manager.detections_path(config.detections_dir.as_deref());
    let detections = load_detections(&detections_path)?;
    debug!(
        "Loaded {} detections from {}",
        detections.len(),
        detections_path.display()
    );

    let image = image::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?;
    let image_size = (image.width(), image.height());

    let (reports, annotated_path) = if config.annotate {
        let analysis = analyzer.analyze(&detections, Some(&image))?;
        let output_path = output_manager.annotated_image_path()?;
        std::fs::write(&output_path, &analysis.annotated_jpeg).with_context(|| {
            format!("Failed to write annotated image {}", output_path.display())
        })?;
        debug!("Annotated image saved to: {}", output_path.display());
        (analysis.reports(), Some(output_path))
    } else {
        let measurements = analyzer.measure(&detections, Some(&image))?;
        let reports = measurements.into_iter().map(|m| m.report).collect();
        (reports, None)
    };

    Ok(LesionResult {
        image_path: image_path.to_path_buf(),
        detections_path,
        annotated_path,
        image_size,
        detection_counts: count_by_class(&detections),
        reports,
        processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

fn save_metadata_for_file(
    result: &LesionResult,
    config: &AnalyzeConfig,
    context: &RunContext,
) -> Result<()> {
    let output_manager = OutputManager::new(&config.base, &result.image_path);

    let execution = ExecutionContext {
        timestamp: Some(context.start_timestamp),
        leafscan_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        command_line: Some(context.command_line.clone()),
        exit_code: Some(0),
        processing_time_ms: Some(result.processing_time_ms),
        leafscan_env_vars: collect_leafscan_env_vars(),
    };

    let input = InputProcessing {
        image_path: result.image_path.to_string_lossy().to_string(),
        detections_path: result.detections_path.to_string_lossy().to_string(),
        sources: config.base.sources.clone(),
        source_types: context.source_types.clone(),
        strict_mode: config.base.strict,
    };

    let sections = LesionSections {
        core: Some(result.core_results(&output_manager)?),
        config: Some(toml::Value::try_from(config).context("Failed to serialize config")?),
        execution: Some(execution),
        input: Some(input),
    };
    output_manager.save_lesion_metadata(sections)
}
