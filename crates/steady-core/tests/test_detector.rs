mod common;

use ndarray::Array2;

use steady_core::detect::{detect_corners, FeatureDetector, FeatureDetectorSettings, KeyPoint};
use steady_core::geometry::{Point2f, Rect2f};

use common::{textured_pattern, to_u8};

fn settings_for(shape: (usize, usize)) -> FeatureDetectorSettings {
    FeatureDetectorSettings {
        detection_resolution: shape,
        ..FeatureDetectorSettings::default()
    }
}

#[test]
fn fast_finds_an_isolated_corner() {
    // A bright square on a dark background has corners at its vertices.
    let mut image = Array2::<u8>::zeros((64, 64));
    for r in 20..40 {
        for c in 20..40 {
            image[[r, c]] = 220;
        }
    }

    let mut corners = Vec::new();
    detect_corners(&image, Rect2f::new(0.0, 0.0, 64.0, 64.0), 40, &mut corners);

    assert!(!corners.is_empty());
    // Every detection sits near one of the four vertices, not on an edge.
    for corner in &corners {
        let near_vertex = [(20.0, 20.0), (20.0, 39.0), (39.0, 20.0), (39.0, 39.0)]
            .iter()
            .any(|&(x, y)| {
                (corner.position.x - x).abs() <= 2.0 && (corner.position.y - y).abs() <= 2.0
            });
        assert!(near_vertex, "stray corner at {:?}", corner.position);
    }
}

#[test]
fn fast_reports_nothing_on_flat_input() {
    let image = Array2::<u8>::from_elem((64, 64), 128);
    let mut corners = Vec::new();
    detect_corners(&image, Rect2f::new(0.0, 0.0, 64.0, 64.0), 10, &mut corners);
    assert!(corners.is_empty());
}

#[test]
fn detector_produces_distributed_corners() {
    let shape = (180, 320);
    let image = to_u8(&textured_pattern(shape, 8, 42));

    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();
    let mut features = Vec::new();
    let quality = detector.detect(&image, &mut features).unwrap();

    assert!(
        features.len() >= 40,
        "only {} corners detected",
        features.len()
    );
    assert!(features.len() <= detector.max_feature_capacity());
    assert!(quality > 0.5, "distribution quality {quality}");

    // At most one corner per suppression cell: all keys unique.
    let mut keys: Vec<(usize, usize)> = Vec::new();
    let cell_w = 320.0 / 20.0;
    let cell_h = 180.0 / 20.0;
    for f in &features {
        keys.push(((f.position.x / cell_w) as usize, (f.position.y / cell_h) as usize));
    }
    keys.sort_unstable();
    let before = keys.len();
    keys.dedup();
    assert_eq!(before, keys.len());
}

#[test]
fn propagation_suppresses_redetection() {
    let shape = (180, 320);
    let image = to_u8(&textured_pattern(shape, 8, 42));

    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();
    let mut features = Vec::new();
    detector.detect(&image, &mut features).unwrap();

    // Propagate a dense corner set back: every zone now reports a load
    // above the minimum, so the next detection pass re-emits exactly the
    // propagated corners.
    detector.propagate(&features);
    let mut second = Vec::new();
    detector.detect(&image, &mut second).unwrap();
    assert_eq!(second.len(), features.len());

    // After a reset, detection starts from scratch and re-detects.
    detector.reset();
    let mut third = Vec::new();
    detector.detect(&image, &mut third).unwrap();
    assert!(!third.is_empty());
}

#[test]
fn sparse_propagation_triggers_redetection() {
    let shape = (180, 320);
    let image = to_u8(&textured_pattern(shape, 8, 42));

    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();
    let mut features = Vec::new();
    detector.detect(&image, &mut features).unwrap();
    let full_count = features.len();

    // Propagating only a handful of corners leaves every zone starved,
    // so new corners are detected to replace the lost ones.
    detector.propagate(&features[..4.min(features.len())]);
    let mut second = Vec::new();
    detector.detect(&image, &mut second).unwrap();
    assert!(second.len() > full_count / 2);
}

#[test]
fn propagated_corners_hold_their_cells() {
    let shape = (64, 64);
    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();

    // A tracked corner sits right next to a strong detectable vertex, in
    // the same suppression cell. Its zone load stays far below the
    // minimum, so re-detection still runs.
    detector.propagate(&[KeyPoint {
        position: Point2f::new(21.0, 21.0),
        response: 0.5,
        propagated: false,
    }]);

    let mut image = Array2::<u8>::zeros(shape);
    for r in 20..40 {
        for c in 20..40 {
            image[[r, c]] = 220;
        }
    }

    let mut features = Vec::new();
    detector.detect(&image, &mut features).unwrap();

    // The tracked corner keeps its cell against the stronger fresh
    // detection at the square's vertex.
    let kept = features
        .iter()
        .find(|f| f.position == Point2f::new(21.0, 21.0))
        .expect("propagated corner should survive re-detection");
    assert!(kept.propagated);
    assert!((kept.response - 0.5).abs() < 1e-6);
}

#[test]
fn failed_cycles_keep_propagated_state() {
    let shape = (180, 320);
    let image = to_u8(&textured_pattern(shape, 8, 42));

    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();
    let mut features = Vec::new();
    detector.detect(&image, &mut features).unwrap();
    detector.propagate(&features);

    // A failed tracking cycle never propagates; detection must keep
    // returning the previous cycle's corners instead of cold-resetting.
    let flat = Array2::<u8>::from_elem(shape, 128);
    for _ in 0..3 {
        let mut survivors = Vec::new();
        detector.detect(&flat, &mut survivors).unwrap();
        assert_eq!(survivors.len(), features.len());
        assert!(survivors.iter().all(|f| f.propagated));
    }
}

#[test]
fn out_of_bounds_propagation_is_ignored() {
    let shape = (64, 64);
    let mut detector = FeatureDetector::new(settings_for(shape)).unwrap();

    detector.propagate(&[KeyPoint {
        position: Point2f::new(-10.0, 500.0),
        response: 1.0,
        propagated: false,
    }]);

    let image = Array2::<u8>::from_elem(shape, 100);
    let mut features = Vec::new();
    detector.detect(&image, &mut features).unwrap();
    assert!(features.is_empty());
}

#[test]
fn detector_rejects_wrong_resolution() {
    let mut detector = FeatureDetector::new(settings_for((64, 64))).unwrap();
    let image = Array2::<u8>::zeros((32, 32));
    let mut features = Vec::new();
    assert!(detector.detect(&image, &mut features).is_err());
}

#[test]
fn invalid_settings_are_rejected() {
    let mut settings = settings_for((64, 64));
    settings.min_feature_density = 0.9;
    settings.max_feature_density = 0.1;
    assert!(FeatureDetector::new(settings).is_err());

    let mut settings = settings_for((64, 64));
    settings.detection_regions = (0, 2);
    assert!(FeatureDetector::new(settings).is_err());
}
