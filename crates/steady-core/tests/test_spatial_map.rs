use approx::assert_abs_diff_eq;

use steady_core::data::SpatialMap;
use steady_core::geometry::{Point2f, Rect2f};

fn map_over_unit_region(shape: (usize, usize)) -> SpatialMap<u32> {
    SpatialMap::new(shape, Rect2f::new(0.0, 0.0, 100.0, 100.0))
}

#[test]
fn key_lookup_matches_cell_bounds() {
    let map = map_over_unit_region((4, 4));

    assert_eq!(map.try_key_of(Point2f::new(0.0, 0.0)), Some((0, 0)));
    assert_eq!(map.try_key_of(Point2f::new(99.9, 99.9)), Some((3, 3)));
    assert_eq!(map.try_key_of(Point2f::new(30.0, 60.0)), Some((1, 2)));

    // Outside the aligned region there is no key.
    assert_eq!(map.try_key_of(Point2f::new(100.0, 50.0)), None);
    assert_eq!(map.try_key_of(Point2f::new(-0.1, 50.0)), None);
}

#[test]
fn place_overwrites_and_reads_with_default() {
    let mut map = map_over_unit_region((2, 2));

    map.place_at((0, 1), 7);
    map.emplace_at((0, 1), 9);
    assert_eq!(map.at((0, 1)), Some(&9));
    assert_eq!(map.size(), 1);

    let default = 42;
    assert_eq!(*map.at_or((1, 1), &default), 42);
    assert_eq!(*map.at_or((0, 1), &default), 9);
}

#[test]
fn rescale_resets_and_align_reanchors() {
    let mut map = map_over_unit_region((2, 2));
    map.place_at((0, 0), 1);

    map.rescale((5, 5));
    assert!(map.is_empty());
    assert_eq!(map.rows(), 5);

    map.align(Rect2f::new(50.0, 50.0, 50.0, 50.0));
    assert_eq!(map.try_key_of(Point2f::new(10.0, 10.0)), None);
    assert_eq!(map.try_key_of(Point2f::new(55.0, 55.0)), Some((0, 0)));
}

#[test]
fn distribution_quality_extremes() {
    // Uniform occupation: one value in every cell of a grid that tiles
    // evenly into the 5x5 quality sectors.
    let mut full = map_over_unit_region((10, 10));
    for row in 0..10 {
        for col in 0..10 {
            full.place_at((col, row), 1);
        }
    }
    assert!((full.distribution_quality() - 1.0).abs() < 1e-9);

    // A single occupied cell has no spread at all.
    let mut single = map_over_unit_region((10, 10));
    single.place_at((4, 4), 1);
    assert_eq!(single.distribution_quality(), 0.0);

    // Everything clustered in one corner scores poorly.
    let mut clustered = map_over_unit_region((10, 10));
    for row in 0..2 {
        for col in 0..2 {
            clustered.place_at((col, row), 1);
        }
    }
    assert!(clustered.distribution_quality() < 0.2);

    assert_eq!(map_over_unit_region((10, 10)).distribution_quality(), 0.0);
}

#[test]
fn distribution_centroid_weights_keys_uniformly() {
    let mut map = map_over_unit_region((5, 5));
    assert_eq!(map.distribution_centroid(), None);

    map.place_at((0, 0), 1);
    map.place_at((4, 0), 1);
    map.place_at((0, 4), 1);
    map.place_at((4, 4), 1);

    let centroid = map.distribution_centroid().unwrap();
    assert_abs_diff_eq!(centroid.x, 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(centroid.y, 2.0, epsilon = 1e-6);
}
