#[cfg(feature = "raster")]
pub mod pdfium;
