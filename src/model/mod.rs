//! Output types shared by the decoding and rendering paths.

mod raster;

pub use raster::Raster;
