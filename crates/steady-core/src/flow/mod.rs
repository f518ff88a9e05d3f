pub mod lucas_kanade;
pub mod pyramid;

pub use lucas_kanade::{track_points, FlowStatus};
pub use pyramid::Pyramid;
