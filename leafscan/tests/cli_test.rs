use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// CLI tests run the built binary as a subprocess

fn run_leafscan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_leafscan"))
        .args(args)
        .env("LEAFSCAN_NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute leafscan")
}

fn write_photo(dir: &Path, stem: &str) -> PathBuf {
    let path = dir.join(format!("{stem}.jpg"));
    RgbImage::from_fn(160, 120, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 60]))
        .save(&path)
        .unwrap();
    path
}

fn write_detections(dir: &Path, stem: &str) {
    let detections = serde_json::json!({
        "detections": [
            {"id": 1, "xyxy": [5.0, 5.0, 105.0, 85.0], "conf": 0.91, "cls": 4.0},
            {"id": 2, "xyxy": [20.0, 20.0, 40.0, 45.0], "conf": 0.55, "cls": 1.0},
            {"id": 3, "xyxy": [60.0, 30.0, 80.0, 50.0], "conf": 0.48, "cls": 3.0}
        ]
    });
    std::fs::write(dir.join(format!("{stem}.json")), detections.to_string()).unwrap();
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_classify_prints_tier() {
    let output = run_leafscan(&["classify", "--ratio", "0.3", "--count", "50"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");

    let output = run_leafscan(&["classify", "--ratio", "0.05", "--count", "5"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "7");
}

#[test]
fn test_classify_rejects_out_of_range_ratio() {
    let output = run_leafscan(&["classify", "--ratio", "1.5", "--count", "5"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("between 0.0 and 1.0"), "got: {stderr}");
}

#[test]
fn test_version() {
    let output = run_leafscan(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("leafscan v"));
    assert!(stdout.contains("lesion classes 1-3"));
}

#[test]
fn test_analyze_writes_annotation_metadata_and_summary() {
    let temp_dir = TempDir::new().unwrap();
    let photo = write_photo(temp_dir.path(), "leaf_a");
    write_detections(temp_dir.path(), "leaf_a");
    let summary = temp_dir.path().join("summary.json");

    let output = run_leafscan(&[
        "analyze",
        path_arg(&photo),
        "--metadata",
        "--summary",
        path_arg(&summary),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let annotated = temp_dir.path().join("leaf_a_lesions.jpg");
    let decoded = image::open(&annotated).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (160, 120));

    let toml_text = std::fs::read_to_string(temp_dir.path().join("leaf_a.leafscan.toml")).unwrap();
    let metadata: toml::Value = toml::from_str(&toml_text).unwrap();
    assert_eq!(
        metadata["lesions"]["annotated_image"].as_str(),
        Some("leaf_a_lesions.jpg")
    );
    assert_eq!(
        metadata["lesions"]["detection_counts"]["T1"].as_integer(),
        Some(1)
    );

    let rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["lesion_count"], 2);
    assert_eq!(rows[0]["leaf_index"], 0);
    assert_eq!(rows[0]["image"], "leaf_a");
    assert!(rows[0]["tier"].as_u64().is_some());
}

#[test]
fn test_analyze_output_dir_and_detections_dir() {
    let temp_dir = TempDir::new().unwrap();
    let photos = temp_dir.path().join("photos");
    let detections = temp_dir.path().join("detections");
    let out = temp_dir.path().join("out");
    std::fs::create_dir_all(&photos).unwrap();
    std::fs::create_dir_all(&detections).unwrap();
    write_photo(&photos, "leaf_a");
    write_photo(&photos, "leaf_b");
    write_detections(&detections, "leaf_a");
    write_detections(&detections, "leaf_b");

    let output = run_leafscan(&[
        "analyze",
        path_arg(&photos),
        "--detections-dir",
        path_arg(&detections),
        "--output-dir",
        path_arg(&out),
        "--parallel",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(out.join("leaf_a.jpg").exists());
    assert!(out.join("leaf_b.jpg").exists());
    // Metadata is opt-in
    assert!(!out.join("leaf_a.leafscan.toml").exists());
}

#[test]
fn test_missing_detections_strict_vs_permissive() {
    let temp_dir = TempDir::new().unwrap();
    write_photo(temp_dir.path(), "leaf_a");
    write_detections(temp_dir.path(), "leaf_a");
    write_photo(temp_dir.path(), "leaf_b");
    let dir = path_arg(temp_dir.path()).to_string();

    let output = run_leafscan(&["analyze", &dir]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("leaf_b.json"), "got: {stderr}");

    let output = run_leafscan(&["--permissive", "analyze", &dir]);
    assert!(output.status.success());
    assert!(temp_dir.path().join("leaf_a_lesions.jpg").exists());
    assert!(!temp_dir.path().join("leaf_b_lesions.jpg").exists());
}

#[test]
fn test_invalid_lesion_classes() {
    let temp_dir = TempDir::new().unwrap();
    let photo = write_photo(temp_dir.path(), "leaf_a");

    let output = run_leafscan(&[
        "analyze",
        path_arg(&photo),
        "--leaf-class",
        "2",
        "--lesion-classes",
        "1-3",
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must not fall inside"), "got: {stderr}");
}
