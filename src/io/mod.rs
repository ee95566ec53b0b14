//! I/O modules for latitude/longitude rasters and validity masks

pub mod raster;
pub mod mask;

pub use raster::{Band, RasterSource, ArrayRasterSource, GdalRasterSource};
pub use mask::{ValidityMask, BitMask};
