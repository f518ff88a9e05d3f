pub mod estimation;
pub mod homography;

pub use estimation::{estimate_homography, EstimationProfile};
pub use homography::Homography;
