//! Streaming writer module
//!
//! Drives a producer through the pieces of a partitioned region and hands each
//! one to a sink, with optional pasting and compression.

mod cancel;
mod pipeline;
mod report;
mod sink;
pub mod types;

#[cfg(test)]
mod tests;

pub use cancel::CancelToken;
pub use pipeline::StreamingWriter;
pub use report::{PieceReport, WriteReport};
pub use sink::{ImageLayout, Sink, SinkCapabilities, SinkMode, SinkPlan};
pub use types::{
    CompressedPastePolicy, PasteTargetPolicy, WriteRequest, WriteRequestBuilder, WriterConfig,
    WriterConfigBuilder,
};
