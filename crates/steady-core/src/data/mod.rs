pub mod spatial_map;
pub mod stream_buffer;

pub use spatial_map::{SpatialMap, VirtualGrid};
pub use stream_buffer::StreamBuffer;
