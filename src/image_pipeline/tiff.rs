//! TIFF stack module
//!
//! Multi-page grayscale TIFF output and input, one page per slice along the
//! third axis, with optional LZW or Deflate compression.

mod stack_reader;
mod stack_sink;
pub mod types;


pub use stack_reader::{TiffStackProducer, read_tiff_stack};
pub use stack_sink::TiffStackSink;
pub use types::{TiffCompression, TiffSinkConfig, TiffSinkConfigBuilder};
