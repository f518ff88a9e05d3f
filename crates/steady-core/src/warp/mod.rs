pub mod field;
pub mod remap;

pub use field::WarpField;
pub use remap::RemapOptions;
