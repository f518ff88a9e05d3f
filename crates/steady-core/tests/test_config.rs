use steady_core::pipeline::StabilizationSettings;

#[test]
fn default_settings_validate() {
    let settings = StabilizationSettings::default();
    assert!(settings.validate().is_ok());
    assert_eq!(settings.motion_resolution, (2, 2));
    assert_eq!(settings.path_prediction_frames, 10);
    assert!((settings.scene_margins - 0.1).abs() < 1e-6);
    assert!((settings.min_tracking_quality - 0.3).abs() < 1e-9);
    assert!((settings.min_scene_quality - 0.8).abs() < 1e-9);
}

#[test]
fn settings_round_trip_through_json() {
    let mut settings = StabilizationSettings::default();
    settings.motion_resolution = (16, 16);
    settings.crop_frame_to_margins = true;
    settings.minimum_tracking_points = 60;

    let encoded = serde_json::to_string(&settings).unwrap();
    let decoded: StabilizationSettings = serde_json::from_str(&encoded).unwrap();

    assert_eq!(decoded.motion_resolution, (16, 16));
    assert!(decoded.crop_frame_to_margins);
    assert_eq!(decoded.minimum_tracking_points, 60);
}

#[test]
fn partial_json_fills_defaults() {
    let decoded: StabilizationSettings =
        serde_json::from_str(r#"{"path_prediction_frames": 4}"#).unwrap();
    assert_eq!(decoded.path_prediction_frames, 4);
    assert_eq!(decoded.motion_resolution, (2, 2));
    assert!(decoded.stabilize_output);
}

#[test]
fn component_settings_inherit_motion_resolution() {
    let mut settings = StabilizationSettings::default();
    settings.motion_resolution = (8, 12);

    assert_eq!(settings.tracker_settings().motion_resolution, (8, 12));
    assert_eq!(settings.smoother_settings().motion_resolution, (8, 12));
    assert_eq!(
        settings.tracker_settings().detector.detection_resolution,
        settings.tracking_resolution
    );
}

#[test]
fn invalid_values_are_rejected() {
    let mut settings = StabilizationSettings::default();
    settings.scene_margins = 0.6;
    assert!(settings.validate().is_err());

    let mut settings = StabilizationSettings::default();
    settings.min_feature_density = 0.0;
    assert!(settings.validate().is_err());

    let mut settings = StabilizationSettings::default();
    settings.minimum_tracking_points = 2;
    assert!(settings.validate().is_err());
}
