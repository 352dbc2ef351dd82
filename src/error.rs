use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfMonoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Input error: {0}")]
    InputError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Structural error: {0}")]
    StructuralError(String),

    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("PDF read error: {0}")]
    PdfReadError(String),

    #[error("PDF write error: {0}")]
    PdfWriteError(String),

    #[error("Content stream error: {0}")]
    ContentStreamError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("JPEG encode error: {0}")]
    JpegEncodeError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("page {page} ({stage}): {source}")]
    PageError {
        page: u32,
        stage: &'static str,
        #[source]
        source: Box<PdfMonoError>,
    },
}

/// Generates factory methods for [`PdfMonoError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl PdfMonoError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create an input (path) error.
    input => InputError,
    /// Create an invalid-input error (wrong color component count).
    invalid_input => InvalidInput,
    /// Create a structural error (malformed token stream).
    structural => StructuralError,
    /// Create an image decode error.
    decode => DecodeError,
    /// Create a PDF read error.
    pdf_read => PdfReadError,
    /// Create a PDF write error.
    pdf_write => PdfWriteError,
    /// Create a content stream error.
    content_stream => ContentStreamError,
    /// Create a render error.
    render => RenderError,
    /// Create a JPEG encode error.
    jpeg_encode => JpegEncodeError,
}

impl PdfMonoError {
    /// Attach the 1-based page number and pipeline stage to a fatal error.
    pub fn at_page(self, page: u32, stage: &'static str) -> Self {
        Self::PageError {
            page,
            stage,
            source: Box::new(self),
        }
    }
}

impl From<lopdf::Error> for PdfMonoError {
    fn from(e: lopdf::Error) -> Self {
        Self::PdfReadError(e.to_string())
    }
}

impl From<serde_json::Error> for PdfMonoError {
    fn from(e: serde_json::Error) -> Self {
        Self::PdfWriteError(e.to_string())
    }
}

impl From<serde_yml::Error> for PdfMonoError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

#[cfg(feature = "raster")]
impl From<pdfium_render::prelude::PdfiumError> for PdfMonoError {
    fn from(e: pdfium_render::prelude::PdfiumError) -> Self {
        Self::RenderError(e.to_string())
    }
}

impl From<image::ImageError> for PdfMonoError {
    fn from(e: image::ImageError) -> Self {
        Self::JpegEncodeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfMonoError>;
