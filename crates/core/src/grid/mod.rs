//! Grid rasterization, flat grids and mass accumulators

pub mod accumulators;
pub mod fields;
pub mod raster;
pub mod region;

// Re-export main types
pub use accumulators::SourceAccumulator;
pub use fields::FieldData;
pub use raster::{rasterize, Cell, Line};
pub use region::RegionMask;
