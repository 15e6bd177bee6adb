pub(crate) mod chunker;
pub(crate) mod raster;
