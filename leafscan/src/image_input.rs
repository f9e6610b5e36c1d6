//! Resolving command-line sources into the list of leaf photos to analyse.

use crate::output_manager::ANNOTATED_SUFFIX;
use anyhow::{anyhow, Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tiff", "tif"];

/// How strictly sources are resolved
#[derive(Debug, Clone)]
pub struct ImageInputConfig {
    /// Fail on missing or unsupported sources instead of warning
    pub strict_mode: bool,
    /// A glob that matches nothing is an error
    pub require_glob_matches: bool,
}

impl ImageInputConfig {
    pub fn from_strict_flag(strict: bool) -> Self {
        Self {
            strict_mode: strict,
            require_glob_matches: strict,
        }
    }

    /// Report a problem with one source: an error in strict mode, a warning otherwise.
    fn reject(&self, message: String) -> Result<()> {
        if self.strict_mode {
            return Err(anyhow!(message));
        }
        warn!("{}{message}", crate::color_utils::symbols::warning());
        Ok(())
    }
}

/// Supported extensions, case-insensitive
pub fn is_supported_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Annotated images written by a previous run, e.g. `leaf_lesions.jpg`
pub fn is_annotated_output(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().ends_with(ANNOTATED_SUFFIX))
        .unwrap_or(false)
}

fn is_analysable(path: &Path) -> bool {
    path.is_file() && is_supported_image_file(path) && !is_annotated_output(path)
}

/// Leaf photos directly inside `dir` (non-recursive), sorted
pub fn find_images_in_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if is_analysable(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn looks_like_glob(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

fn expand_glob(pattern: &str, config: &ImageInputConfig, out: &mut Vec<PathBuf>) -> Result<()> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => return config.reject(format!("Invalid glob pattern {pattern}: {e}")),
    };

    let before = out.len();
    for entry in paths {
        match entry {
            Ok(path) if is_analysable(&path) => out.push(path),
            Ok(_) => {}
            Err(e) => warn!(
                "{}Error reading path in glob {pattern}: {e}",
                crate::color_utils::symbols::warning()
            ),
        }
    }

    if out.len() == before && config.require_glob_matches {
        return Err(anyhow!("No image files found matching pattern: {pattern}"));
    }
    Ok(())
}

/// Collect leaf photos from files, directories and glob patterns.
///
/// The result is sorted and de-duplicated. Annotated outputs of earlier runs
/// are never picked up from directories or globs.
pub fn collect_images_from_sources(
    sources: &[String],
    config: &ImageInputConfig,
) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for source in sources {
        let path = Path::new(source);
        if path.is_file() {
            if is_supported_image_file(path) {
                images.push(path.to_path_buf());
            } else {
                config.reject(format!(
                    "File is not a supported image format: {}",
                    path.display()
                ))?;
            }
        } else if path.is_dir() {
            images.extend(find_images_in_directory(path)?);
        } else if looks_like_glob(source) {
            expand_glob(source, config, &mut images)?;
        } else {
            config.reject(format!("File does not exist: {source}"))?;
        }
    }

    images.sort();
    images.dedup();

    if images.is_empty() && config.strict_mode {
        return Err(anyhow!("No image files found in the specified sources"));
    }
    Ok(images)
}
