//! Volume file module
//!
//! A minimal N-dimensional container: a fixed header followed by the raw or
//! zlib-compressed sample payload. Uncompressed payloads support in-place
//! pasting.

pub mod header;
mod volume_producer;
mod volume_sink;


pub use header::VolumeHeader;
pub use volume_producer::{VolumeFileProducer, read_volume};
pub use volume_sink::{VolumeFileSink, write_volume};
