pub mod fast;
pub mod features;

pub use fast::{detect_corners, KeyPoint};
pub use features::{FeatureDetector, FeatureDetectorSettings};
