pub mod color;
pub mod config;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod render;
