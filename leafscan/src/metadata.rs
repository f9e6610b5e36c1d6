use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-image metadata file (`<stem>.leafscan.toml`)
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct LeafscanMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesions: Option<LesionSections>,
}

/// All sections written by the lesion analysis command
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LesionSections {
    // Core results sit directly under [lesions]
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub core: Option<toml::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputProcessing>,
}

/// Execution context for a tool invocation
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecutionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leafscan_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leafscan_env_vars: Option<BTreeMap<String, String>>,
}

/// Where the inputs for one image came from
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct InputProcessing {
    pub image_path: String,
    pub detections_path: String,
    pub sources: Vec<String>,
    pub source_types: Vec<String>,
    pub strict_mode: bool,
}

/// Load existing metadata from a file, or create new empty metadata
pub fn load_or_create_metadata(path: &Path) -> Result<LeafscanMetadata> {
    if !path.exists() {
        return Ok(LeafscanMetadata::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata {}", path.display()))?;
    match toml::from_str::<LeafscanMetadata>(&content) {
        Ok(metadata) => Ok(metadata),
        Err(e) => {
            let colored_error = crate::color_utils::colors::warning_level(&e.to_string());
            warn!(
                "{} Dropping existing metadata from {}:\n{}",
                crate::color_utils::symbols::warning(),
                path.display(),
                colored_error
            );
            Ok(LeafscanMetadata::default())
        }
    }
}

/// Save metadata to a file
pub fn save_metadata(metadata: &LeafscanMetadata, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let toml_content = match toml::to_string_pretty(metadata) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("About to serialize metadata: {metadata:#?}");
            return Err(anyhow::anyhow!(
                "Failed to serialize metadata to TOML: {e}. This usually means a field contains a value that cannot be represented in TOML format."
            ));
        }
    };

    fs::write(path, toml_content)
        .with_context(|| format!("Failed to write metadata {}", path.display()))?;
    Ok(())
}

/// Generate metadata file path for an input image
pub fn get_metadata_path(input_path: &Path, output_dir: Option<&str>) -> Result<PathBuf> {
    let input_stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid input filename"))?;

    let metadata_filename = format!("{input_stem}.leafscan.toml");

    let metadata_path = match output_dir {
        Some(output_dir) => Path::new(output_dir).join(metadata_filename),
        None => input_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(metadata_filename),
    };

    Ok(metadata_path)
}

/// Collect all LEAFSCAN_* environment variables that are present and non-empty
pub fn collect_leafscan_env_vars() -> Option<BTreeMap<String, String>> {
    let vars: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, value)| key.starts_with("LEAFSCAN_") && !value.is_empty())
        .collect();

    if vars.is_empty() {
        None
    } else {
        Some(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_sections() -> LesionSections {
        LesionSections {
            core: Some(
                toml::toml! {
                    image_width = 640
                    image_height = 480
                    annotated_image = "leaf_lesions.jpg"

                    [detection_counts]
                    T2 = 3
                    T4 = 1

                    [[leaves]]
                    leaf_index = 0
                    leaf_area = 5730
                    lesion_area = 310
                    lesion_ratio = 0.0541
                    lesion_count = 3
                    avg_gray_value = 92.5
                    severity = 7
                }
                .into(),
            ),
            config: Some(
                toml::toml! {
                    jpeg_quality = 95
                    parallel = false
                }
                .into(),
            ),
            execution: Some(ExecutionContext {
                timestamp: Some(Utc::now()),
                leafscan_version: Some("0.3.0".to_string()),
                command_line: Some(vec!["analyze".to_string(), "leaf.jpg".to_string()]),
                exit_code: Some(0),
                processing_time_ms: Some(42.0),
                leafscan_env_vars: None,
            }),
            input: Some(InputProcessing {
                image_path: "/data/leaf.jpg".to_string(),
                detections_path: "/data/leaf.json".to_string(),
                sources: vec!["/data".to_string()],
                source_types: vec!["directory".to_string()],
                strict_mode: true,
            }),
        }
    }

    #[test]
    fn test_toml_structure() {
        let metadata = LeafscanMetadata {
            lesions: Some(sample_sections()),
        };

        let toml_output = toml::to_string_pretty(&metadata).unwrap();
        assert!(toml_output.contains("[lesions.execution]"));
        assert!(toml_output.contains("[[lesions.leaves]]"));

        let parsed: LeafscanMetadata = toml::from_str(&toml_output).unwrap();
        let lesions = parsed.lesions.unwrap();
        assert!(lesions.config.is_some());
        assert!(lesions.input.is_some());
        let core = lesions.core.unwrap();
        assert_eq!(core.get("image_width").and_then(|v| v.as_integer()), Some(640));
        assert_eq!(
            lesions.execution.unwrap().leafscan_version.as_deref(),
            Some("0.3.0")
        );
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("leaf.leafscan.toml");
        let metadata = LeafscanMetadata {
            lesions: Some(sample_sections()),
        };

        save_metadata(&metadata, &path).unwrap();
        let reloaded = load_or_create_metadata(&path).unwrap();
        assert!(reloaded.lesions.is_some());
    }

    #[test]
    fn test_corrupt_metadata_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("leaf.leafscan.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let metadata = load_or_create_metadata(&path).unwrap();
        assert!(metadata.lesions.is_none());

        let missing = load_or_create_metadata(&temp_dir.path().join("missing.toml")).unwrap();
        assert!(missing.lesions.is_none());
    }

    #[test]
    fn test_get_metadata_path() {
        let input_path = Path::new("/path/to/leaf.jpg");
        let metadata_path = get_metadata_path(input_path, None).unwrap();
        assert_eq!(metadata_path, Path::new("/path/to/leaf.leafscan.toml"));

        let with_output = get_metadata_path(input_path, Some("/output")).unwrap();
        assert_eq!(with_output, Path::new("/output/leaf.leafscan.toml"));
    }

    #[test]
    fn test_collect_leafscan_env_vars() {
        std::env::set_var("LEAFSCAN_TEST_VAR", "value1");
        std::env::set_var("LEAFSCAN_EMPTY_VAR", "");

        let vars = collect_leafscan_env_vars().unwrap();
        assert_eq!(vars.get("LEAFSCAN_TEST_VAR"), Some(&"value1".to_string()));
        assert!(!vars.contains_key("LEAFSCAN_EMPTY_VAR"));

        std::env::remove_var("LEAFSCAN_TEST_VAR");
        std::env::remove_var("LEAFSCAN_EMPTY_VAR");
    }
}
