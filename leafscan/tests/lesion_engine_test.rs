use image::{DynamicImage, Rgb, RgbImage};
use leafscan::config::{AnalysisConfig, LabelScheme};
use leafscan::{analyze, classify, AnalysisError, Detection, LesionAnalyzer, SeverityTier};

fn leaf(bbox: [f32; 4]) -> Detection {
    Detection::new(0, bbox, 0.9, 4)
}

fn lesion(class_id: u32, bbox: [f32; 4]) -> Detection {
    Detection::new(0, bbox, 0.6, class_id)
}

/// Green field with a darker brown patch where the lesion sits
fn leaf_photo() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(200, 160, |x, y| {
        if (10..30).contains(&x) && (10..30).contains(&y) {
            Rgb([90, 60, 30])
        } else {
            Rgb([60, 160, 50])
        }
    }))
}

#[test]
fn test_single_leaf_report() {
    let detections = vec![
        leaf([0.0, 0.0, 100.0, 80.0]),
        lesion(1, [10.0, 10.0, 30.0, 30.0]),
    ];

    let (reports, jpeg) = analyze(&detections, Some(&leaf_photo())).unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    let expected_area = std::f64::consts::PI * 48.0 * 38.0;
    assert!((report.leaf_area as f64 - expected_area).abs() / expected_area < 0.05);
    assert_eq!(report.lesion_count, 1);
    assert!(report.lesion_area > 0);
    assert!(report.lesion_ratio > 0.0 && report.lesion_ratio < 1.0);
    // The lesion ellipse lies entirely on the brown patch
    let brown_gray = (0.299f64 * 90.0 + 0.587 * 60.0 + 0.114 * 30.0).round();
    assert_eq!(report.avg_gray_value, brown_gray);

    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 160));
}

#[test]
fn test_reports_are_bounded() {
    let detections = vec![
        leaf([0.0, 0.0, 100.0, 80.0]),
        leaf([100.0, 0.0, 200.0, 160.0]),
        lesion(1, [-20.0, -20.0, 60.0, 60.0]),
        lesion(2, [50.0, 30.0, 150.0, 90.0]),
        lesion(3, [120.0, 100.0, 260.0, 200.0]),
    ];

    let (reports, _) = analyze(&detections, Some(&leaf_photo())).unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(report.lesion_area <= report.leaf_area);
        assert!((0.0..=1.0).contains(&report.lesion_ratio));
    }
    assert_eq!(reports[0].lesion_count, 2);
    assert_eq!(reports[1].lesion_count, 2);
}

#[test]
fn test_edge_touching_lesions_do_not_count() {
    let detections = vec![
        leaf([20.0, 20.0, 120.0, 100.0]),
        lesion(2, [0.0, 30.0, 20.0, 50.0]),
        lesion(2, [120.0, 30.0, 140.0, 50.0]),
        lesion(2, [30.0, 0.0, 50.0, 20.0]),
        lesion(2, [30.0, 100.0, 50.0, 120.0]),
    ];

    let (reports, _) = analyze(&detections, Some(&leaf_photo())).unwrap();

    let report = &reports[0];
    assert_eq!(report.lesion_count, 0);
    assert_eq!(report.lesion_area, 0);
    assert_eq!(report.lesion_ratio, 0.0);
    assert_eq!(report.avg_gray_value, 0.0);
    assert_eq!(report.severity(), SeverityTier::Tier9);
}

#[test]
fn test_custom_label_scheme() {
    let config = AnalysisConfig {
        labels: LabelScheme::new(0, (5, 6)).unwrap(),
        ..AnalysisConfig::default()
    };
    let analyzer = LesionAnalyzer::new(config);
    let detections = vec![
        Detection::new(1, [0.0, 0.0, 100.0, 80.0], 0.9, 0),
        Detection::new(2, [10.0, 10.0, 30.0, 30.0], 0.9, 6),
        // Lesion class under the default scheme, ignored here
        Detection::new(3, [40.0, 40.0, 60.0, 60.0], 0.9, 2),
    ];

    let analysis = analyzer.analyze(&detections, Some(&leaf_photo())).unwrap();
    let reports = analysis.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].lesion_count, 1);
}

#[test]
fn test_parallel_and_sequential_agree() {
    let mut detections = Vec::new();
    for i in 0..6 {
        let x = (i % 3) as f32 * 65.0;
        let y = (i / 3) as f32 * 80.0;
        detections.push(leaf([x, y, x + 64.0, y + 79.0]));
        detections.push(lesion(1 + i % 3, [x + 5.0, y + 5.0, x + 25.0, y + 30.0]));
        detections.push(lesion(2, [x + 50.0, y + 60.0, x + 90.0, y + 95.0]));
    }
    let image = leaf_photo();

    let sequential = LesionAnalyzer::new(AnalysisConfig::default())
        .analyze(&detections, Some(&image))
        .unwrap();
    let parallel = LesionAnalyzer::new(AnalysisConfig {
        parallel: true,
        ..AnalysisConfig::default()
    })
    .analyze(&detections, Some(&image))
    .unwrap();

    assert_eq!(sequential.reports(), parallel.reports());
    assert_eq!(sequential.annotated_jpeg, parallel.annotated_jpeg);
}

#[test]
fn test_encoded_input() {
    let mut png = Vec::new();
    leaf_photo()
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let detections = vec![
        leaf([0.0, 0.0, 100.0, 80.0]),
        lesion(3, [10.0, 10.0, 30.0, 30.0]),
    ];

    let analyzer = LesionAnalyzer::new(AnalysisConfig::default());
    let from_bytes = analyzer.analyze_encoded(&detections, &png).unwrap();
    let from_image = analyzer.analyze(&detections, Some(&leaf_photo())).unwrap();
    assert_eq!(from_bytes.reports(), from_image.reports());

    let err = analyzer.analyze_encoded(&detections, &png[..16]).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidImage { .. }));
}

#[test]
fn test_reports_feed_classifier() {
    let detections = vec![
        leaf([0.0, 0.0, 100.0, 80.0]),
        lesion(1, [0.0, 0.0, 100.0, 80.0]),
    ];

    let (reports, _) = analyze(&detections, Some(&leaf_photo())).unwrap();
    let report = &reports[0];
    assert_eq!(report.lesion_ratio, 1.0);
    assert_eq!(report.severity(), classify(1.0, 1));
    // 10.0 + 0.05
    assert_eq!(report.severity(), SeverityTier::Tier1);
}

#[test]
fn test_default_analyze_draws_label_panels() {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 160, Rgb([200, 200, 200])));
    let detections = vec![leaf([20.0, 40.0, 120.0, 100.0])];

    let (_, jpeg) = analyze(&detections, Some(&image)).unwrap();
    let out = image::load_from_memory(&jpeg).unwrap().to_luma8();

    let darkest = |xs: std::ops::Range<u32>, ys: std::ops::Range<u32>| {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .map(|(x, y)| out.get_pixel(x, y)[0])
            .min()
            .unwrap()
    };
    // Caption panel below the box, index panel above it
    assert!(darkest(22..60, 106..112) < 150);
    assert!(darkest(22..40, 2..20) < 150);
    // Right of the box, clear of the caption row, the image is untouched
    assert!(darkest(150..190, 40..95) > 180);
}

#[test]
fn test_extreme_lesion_boxes_do_not_panic() {
    let detections = vec![
        leaf([20.0, 20.0, 120.0, 100.0]),
        lesion(2, [-3.0e9, 30.0, 50.0, 60.0]),
        lesion(3, [f32::MIN, f32::MIN, f32::MAX, f32::MAX]),
    ];

    let (reports, _) = analyze(&detections, Some(&leaf_photo())).unwrap();
    let report = &reports[0];
    assert_eq!(report.lesion_count, 2);
    assert_eq!(report.lesion_area, report.leaf_area);
    assert_eq!(report.lesion_ratio, 1.0);
}
