mod common;

use nalgebra::Matrix3;

use steady_core::geometry::{Point2f, Rect2f};
use steady_core::motion::Homography;
use steady_core::warp::{RemapOptions, WarpField};

use common::{bilinear_zero, interior_mad, textured_pattern};

fn translation(dx: f64, dy: f64) -> Homography {
    Homography::from_matrix(Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0))
}

fn rotation_about(cx: f64, cy: f64, radians: f64) -> Homography {
    let (sin, cos) = radians.sin_cos();
    Homography::from_matrix(Matrix3::new(
        cos,
        -sin,
        cx - cos * cx + sin * cy,
        sin,
        cos,
        cy - sin * cx - cos * cy,
        0.0,
        0.0,
        1.0,
    ))
}

#[test]
fn identity_apply_is_lossless() {
    let pattern = textured_pattern((60, 80), 6, 11);

    let field = WarpField::new((2, 2));
    let warped = field.apply(&pattern).unwrap();
    assert!(interior_mad(&pattern, &warped, 1) < 1e-6);

    let mesh = WarpField::new((8, 8));
    let warped = mesh.apply(&pattern).unwrap();
    assert!(interior_mad(&pattern, &warped, 1) < 1e-6);
}

#[test]
fn minimum_field_matches_direct_inverse_warp() {
    let pattern = textured_pattern((90, 120), 6, 3);
    let warp = rotation_about(60.0, 45.0, 0.05);

    let mut field = WarpField::new((2, 2));
    field.set_to(&warp, (120.0, 90.0));
    let warped = field.apply(&pattern).unwrap();

    // Direct backward warp through the inverse homography.
    let inverse = warp.try_invert().unwrap();
    let (h, w) = pattern.dim();
    let mut direct = pattern.clone();
    for r in 0..h {
        for c in 0..w {
            let source = inverse.apply(Point2f::new(c as f32, r as f32));
            direct[[r, c]] = bilinear_zero(&pattern, source.y, source.x);
        }
    }

    assert!(interior_mad(&direct, &warped, 4) < 2e-2);
}

#[test]
fn homography_round_trip_restores_image() {
    let pattern = textured_pattern((90, 120), 6, 7);
    let warp = translation(3.0, -2.0);

    let mut forward = WarpField::new((2, 2));
    forward.set_to(&warp, (120.0, 90.0));
    let mut backward = WarpField::new((2, 2));
    backward.set_to(&warp.try_invert().unwrap(), (120.0, 90.0));

    let mid = forward.apply(&pattern).unwrap();
    let restored = backward.apply(&mid).unwrap();

    assert!(interior_mad(&pattern, &restored, 6) < 2e-2);
}

#[test]
fn set_to_translation_and_translate_by() {
    let mut field = WarpField::new((4, 4));
    field.set_to_translation(Point2f::new(3.0, -1.0));
    assert_eq!(field.dx()[[2, 2]], -3.0);
    assert_eq!(field.dy()[[2, 2]], 1.0);

    field.translate_by(Point2f::new(3.0, -1.0));
    assert_eq!(field.dx()[[1, 3]], 0.0);
    assert_eq!(field.dy()[[1, 3]], 0.0);
}

#[test]
fn sample_interpolates_bilinearly() {
    let mut field = WarpField::new((2, 2));
    field.translate_by(Point2f::new(0.0, 0.0));
    // One corner displaced; halfway samples blend it.
    let mut dx = field.dx().clone();
    dx[[0, 0]] = 4.0;
    let field = WarpField::from_planes(dx, field.dy().clone());

    let at_corner = field.sample(Point2f::new(0.0, 0.0));
    assert!((at_corner.x - 4.0).abs() < 1e-6);

    let mid_edge = field.sample(Point2f::new(0.5, 0.0));
    assert!((mid_edge.x - 2.0).abs() < 1e-6);

    let centre = field.sample(Point2f::new(0.5, 0.5));
    assert!((centre.x - 1.0).abs() < 1e-6);

    // Outside the grid the nearest edge point is used.
    let clamped = field.sample(Point2f::new(-5.0, -5.0));
    assert!((clamped.x - 4.0).abs() < 1e-6);
}

#[test]
fn resize_preserves_identity_and_interpolates() {
    let identity = WarpField::new((2, 2));
    let grown = identity.resized((9, 9));
    assert_eq!(grown.shape(), (9, 9));
    assert!(grown.dx().iter().all(|&v| v == 0.0));

    let mut field = WarpField::new((2, 2));
    field.set_to_translation(Point2f::new(2.0, 0.0));
    let grown = field.resized((5, 5));
    assert!(grown.dx().iter().all(|&v| (v + 2.0).abs() < 1e-6));
}

#[test]
fn clamp_and_undistort() {
    let mut field = WarpField::new((3, 3));
    field.set_to_translation(Point2f::new(10.0, -10.0));
    field.clamp((4.0, 2.0));
    assert!(field.dx().iter().all(|&v| v == -4.0));
    assert!(field.dy().iter().all(|&v| v == 2.0));

    // undistort keeps the mean and shrinks deviations.
    let mut bumpy = WarpField::new((3, 3));
    bumpy.set_to_translation(Point2f::new(-2.0, 0.0));
    let mut dx = bumpy.dx().clone();
    dx[[1, 1]] = 7.0;
    let mut bumpy = WarpField::from_planes(dx, bumpy.dy().clone());

    let mean_before = bumpy.dx().mean().unwrap();
    bumpy.undistort(0.5);
    let mean_after = bumpy.dx().mean().unwrap();
    assert!((mean_before - mean_after).abs() < 1e-5);
    assert!((bumpy.dx()[[1, 1]] - (mean_before + 0.5 * (7.0 - mean_before))).abs() < 1e-5);
}

#[test]
fn combine_accumulates_weighted() {
    let mut total = WarpField::new((3, 3));
    let mut unit = WarpField::new((3, 3));
    unit.set_to_translation(Point2f::new(-1.0, -2.0));

    total.combine(&unit, 0.25).unwrap();
    total.combine(&unit, 0.75).unwrap();
    assert!(total.dx().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    assert!(total.dy().iter().all(|&v| (v - 2.0).abs() < 1e-6));
}

#[test]
fn combine_rejects_mismatched_shapes() {
    let mut field = WarpField::new((3, 3));
    let other = WarpField::new((4, 4));
    assert!(field.combine(&other, 1.0).is_err());
}

#[test]
fn arithmetic_operators() {
    let mut a = WarpField::new((2, 2));
    a.set_to_translation(Point2f::new(-1.0, 0.0));
    let mut b = WarpField::new((2, 2));
    b.set_to_translation(Point2f::new(-2.0, 0.0));

    let sum = &a + &b;
    assert_eq!(sum.dx()[[0, 0]], 3.0);

    let diff = &b - &a;
    assert_eq!(diff.dx()[[0, 0]], 1.0);

    let scaled = &a * 4.0;
    assert_eq!(scaled.dx()[[1, 1]], 4.0);

    let product = &a * &b;
    assert_eq!(product.dx()[[0, 1]], 2.0);

    let mut c = a.clone();
    c *= 0.5;
    assert_eq!(c.dx()[[0, 0]], 0.5);
    c /= 0.5;
    assert_eq!(c.dx()[[0, 0]], 1.0);
}

#[test]
fn fit_to_recovers_uniform_translation() {
    let region = Rect2f::new(0.0, 0.0, 128.0, 128.0);

    // Matches across the whole region consistent with content moving
    // (+3, +1): motion per match is origin - warped = (-3, -1).
    let mut origin = Vec::new();
    let mut warped = Vec::new();
    for row in 0..12 {
        for col in 0..12 {
            let p = Point2f::new(col as f32 * 10.0 + 5.0, row as f32 * 10.0 + 5.0);
            origin.push(p);
            warped.push(p + Point2f::new(3.0, 1.0));
        }
    }

    let hint = translation(3.0, 1.0);
    let mut field = WarpField::new((8, 8));
    field.fit_to(region, &origin, &warped, Some(&hint));

    for &v in field.dx() {
        assert!((v + 3.0).abs() < 0.5, "dx={v} should be ~-3");
    }
    for &v in field.dy() {
        assert!((v + 1.0).abs() < 0.5, "dy={v} should be ~-1");
    }
}

#[test]
fn fit_to_localizes_disagreeing_motion() {
    let region = Rect2f::new(0.0, 0.0, 128.0, 128.0);

    // Static scene except a patch in the top-left moving (+4, 0).
    let mut origin = Vec::new();
    let mut warped = Vec::new();
    for row in 0..12 {
        for col in 0..12 {
            let p = Point2f::new(col as f32 * 10.0 + 5.0, row as f32 * 10.0 + 5.0);
            origin.push(p);
            if row < 3 && col < 3 {
                warped.push(p + Point2f::new(4.0, 0.0));
            } else {
                warped.push(p);
            }
        }
    }

    let mut field = WarpField::new((8, 8));
    field.fit_to(region, &origin, &warped, None);

    // The moving corner pulls its local cells, the far corner stays put.
    assert!(field.dx()[[0, 0]] < -1.0);
    assert!(field.dx()[[7, 7]].abs() < 0.5);
}

#[test]
fn crop_in_of_identity_magnifies_centre() {
    let pattern = textured_pattern((80, 80), 8, 21);

    let mut crop = WarpField::new((2, 2));
    crop.crop_in(Rect2f::new(8.0, 8.0, 64.0, 64.0), (80, 80));
    let cropped = crop.apply(&pattern).unwrap();

    // The destination centre now shows the region centre, and the
    // top-left shows the region's top-left rather than the frame's.
    let centre_src = pattern[[40, 40]];
    assert!((cropped[[40, 40]] - centre_src).abs() < 0.15);
    assert!((cropped[[0, 0]] - pattern[[8, 8]]).abs() < 0.15);
}

#[test]
fn remap_smoothing_is_optional() {
    let pattern = textured_pattern((64, 64), 8, 5);

    let mut dx = ndarray::Array2::<f32>::zeros((8, 8));
    dx[[4, 4]] = 9.0; // speckle
    let field = WarpField::from_planes(dx, ndarray::Array2::zeros((8, 8)));

    let raw = field
        .apply_with(&pattern, RemapOptions { smooth_field: false })
        .unwrap();
    let smoothed = field
        .apply_with(&pattern, RemapOptions { smooth_field: true })
        .unwrap();

    // The median pass removes the isolated spike entirely, so the
    // smoothed output matches the identity warp more closely.
    let identity = WarpField::new((8, 8)).apply(&pattern).unwrap();
    assert!(interior_mad(&identity, &smoothed, 2) <= interior_mad(&identity, &raw, 2));
}
