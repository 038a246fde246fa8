//! Pixel data module
//!
//! Sample types and the dense buffers handed from producers to sinks.

mod buffer;
pub mod sample;

pub use buffer::PixelBuffer;
pub use sample::{PixelType, Sample};
