pub mod color_rewriter;
pub mod content_stream;
pub mod image_xobject;
pub mod inspector;
pub mod optimizer;
pub mod reader;
pub mod resources;
pub mod separation;
pub mod writer;
