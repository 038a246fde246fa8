//! Streaming region write pipeline
//!
//! This module provides a structured approach to writing large images in
//! pieces, with separate modules for region partitioning, pixel producers,
//! output formats, the streaming writer and tolerance comparison.

pub mod common;
pub mod compare;
pub mod format;
pub mod pixel;
pub mod producer;
pub mod region;
pub mod tiff;
pub mod volume;
pub mod writer;

pub use common::{PipelineError, Result};

pub use region::{Region, RegionPartitioner, SplitAxis, partition};

pub use pixel::{PixelBuffer, PixelType, Sample};

pub use producer::{InMemoryProducer, MonitoredProducer, PixelProducer};

pub use writer::{
    CancelToken, CompressedPastePolicy, PasteTargetPolicy, Sink, StreamingWriter, WriteReport,
    WriteRequest, WriterConfig,
};

pub use compare::{ComparisonResult, ToleranceComparator, compare};

pub use volume::{VolumeFileProducer, VolumeFileSink, read_volume, write_volume};

pub use self::tiff::{TiffCompression, TiffSinkConfig, TiffStackProducer, TiffStackSink, read_tiff_stack};

pub use format::{FormatProducer, FormatSink, ImageFormat, open_producer, open_sink, read_image};
