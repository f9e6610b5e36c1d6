//! Batch summary export: one JSON row per analysed leaf.

use crate::lesion_analysis::LeafLesionReport;
use crate::severity::SeverityTier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSummaryRow {
    pub image: String,
    pub leaf_index: usize,
    pub tier: SeverityTier,
    pub lesion_ratio: f64,
    pub lesion_count: u32,
    pub avg_gray_value: f64,
}

impl LeafSummaryRow {
    pub fn from_report(image: impl Into<String>, report: &LeafLesionReport) -> Self {
        Self {
            image: image.into(),
            leaf_index: report.leaf_index,
            tier: report.severity(),
            lesion_ratio: report.lesion_ratio,
            lesion_count: report.lesion_count,
            avg_gray_value: report.avg_gray_value,
        }
    }
}

/// Write rows as a pretty-printed JSON array, creating parent directories.
pub fn write_summary(path: &Path, rows: &[LeafSummaryRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(rows).context("Failed to serialize summary")?;
    fs::write(path, json).with_context(|| format!("Failed to write summary {}", path.display()))
}
