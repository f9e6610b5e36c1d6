// Separate file so the engine, the loader and the CLI can share it without
// pulling in each other.
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One box reported by the upstream object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub id: u32,
    /// `[x1, y1, x2, y2]` in source-image pixels.
    #[serde(alias = "xyxy")]
    pub bbox: [f32; 4],
    #[serde(alias = "conf", default)]
    pub confidence: f32,
    #[serde(
        rename = "class",
        alias = "cls",
        deserialize_with = "class_id_from_number"
    )]
    pub class_id: u32,
}

impl Detection {
    pub fn new(id: u32, bbox: [f32; 4], confidence: f32, class_id: u32) -> Self {
        Self {
            id,
            bbox,
            confidence,
            class_id,
        }
    }

    pub fn x1(&self) -> f32 {
        self.bbox[0]
    }

    pub fn y1(&self) -> f32 {
        self.bbox[1]
    }

    pub fn x2(&self) -> f32 {
        self.bbox[2]
    }

    pub fn y2(&self) -> f32 {
        self.bbox[3]
    }
}

/// Detectors that emit tensors serialize class ids as floats (`4.0`).
fn class_id_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!(
            "class must be a non-negative integer, got {value}"
        )));
    }
    Ok(value as u32)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    List(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

/// Parse detections from JSON: either a bare array or `{ "detections": [...] }`.
pub fn parse_detections(json: &str) -> Result<Vec<Detection>> {
    let file: DetectionFile = serde_json::from_str(json)
        .context("Detections must be an array or an object with a `detections` array")?;
    Ok(match file {
        DetectionFile::List(detections) => detections,
        DetectionFile::Wrapped { detections } => detections,
    })
}

/// Load a detections JSON file from disk
pub fn load_detections(path: &Path) -> Result<Vec<Detection>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read detections file {}", path.display()))?;
    parse_detections(&content)
        .with_context(|| format!("Invalid detections in {}", path.display()))
}

/// Count detections per class, keyed `T<class>`.
pub fn count_by_class(detections: &[Detection]) -> BTreeMap<String, usize> {
    detections
        .iter()
        .fold(BTreeMap::new(), |mut acc, detection| {
            *acc.entry(format!("T{}", detection.class_id)).or_insert(0) += 1;
            acc
        })
}
