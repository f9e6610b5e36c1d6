//! Output path management for the lesion analysis batch runner.
//!
//! Handles where everything derived from one input image lives:
//! - the detections file it is paired with
//! - the annotated image (next to the input, or in `--output-dir`)
//! - the metadata file and paths recorded relative to it

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::config::BaseConfig;
use crate::metadata::{get_metadata_path, load_or_create_metadata, save_metadata, LesionSections};

/// Stem suffix of annotated images written next to their input
pub const ANNOTATED_SUFFIX: &str = "_lesions";

/// Output path management for one input image
pub struct OutputManager<'a> {
    base: &'a BaseConfig,
    input_path: &'a Path,
}

impl<'a> OutputManager<'a> {
    pub fn new(base: &'a BaseConfig, input_path: &'a Path) -> Self {
        Self { base, input_path }
    }

    /// Get the input file stem (filename without extension)
    fn input_stem(&self) -> &str {
        self.input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
    }

    fn input_dir(&self) -> &Path {
        self.input_path.parent().unwrap_or(Path::new("."))
    }

    /// Detections file paired with the input: `<dir>/<stem>.json`, where `dir`
    /// is `detections_dir` when given and the input's own directory otherwise.
    pub fn detections_path(&self, detections_dir: Option<&str>) -> PathBuf {
        let filename = format!("{}.json", self.input_stem());
        match detections_dir {
            Some(dir) => Path::new(dir).join(filename),
            None => self.input_dir().join(filename),
        }
    }

    /// Annotated JPEG path.
    ///
    /// Next to the input it is `<stem>_lesions.jpg`; inside `--output-dir` the
    /// clean `<stem>.jpg` is used unless that would overwrite the input itself.
    pub fn annotated_image_path(&self) -> Result<PathBuf> {
        let stem = self.input_stem();
        let suffixed = format!("{stem}{ANNOTATED_SUFFIX}.jpg");

        let Some(output_dir) = &self.base.output_dir else {
            return Ok(self.input_dir().join(suffixed));
        };

        let output_dir = Path::new(output_dir);
        std::fs::create_dir_all(output_dir)?;
        let clean = output_dir.join(format!("{stem}.jpg"));
        if same_file(&clean, self.input_path) {
            debug!(
                "Output would overwrite input {}, keeping suffix",
                self.input_path.display()
            );
            return Ok(output_dir.join(suffixed));
        }
        Ok(clean)
    }

    pub fn metadata_path(&self) -> Result<PathBuf> {
        get_metadata_path(self.input_path, self.base.output_dir.as_deref())
    }

    /// Make a file path relative to the metadata file location
    pub fn make_relative_to_metadata(&self, path: &Path) -> Result<String> {
        if self.base.skip_metadata {
            return Ok(path.to_string_lossy().to_string());
        }
        make_path_relative_to_toml(path, &self.metadata_path()?)
    }

    /// Replace the lesion sections of this input's metadata file
    pub fn save_lesion_metadata(&self, sections: LesionSections) -> Result<()> {
        if self.base.skip_metadata {
            return Ok(());
        }

        let metadata_path = self.metadata_path()?;
        let mut metadata = load_or_create_metadata(&metadata_path)?;
        metadata.lesions = Some(sections);
        save_metadata(&metadata, &metadata_path)?;

        debug!("📋 Saved metadata to: {}", metadata_path.display());
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Make a file path relative to a TOML file (used for metadata)
pub fn make_path_relative_to_toml(file_path: &Path, toml_path: &Path) -> Result<String> {
    let relative = toml_path
        .parent()
        .and_then(|toml_dir| file_path.strip_prefix(toml_dir).ok());
    match relative {
        // Forward slashes on every platform
        Some(rel_path) => Ok(rel_path.to_string_lossy().replace('\\', "/")),
        None => Ok(file_path.to_string_lossy().to_string()),
    }
}
