use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot split {extent} rows along axis {axis} into {pieces} pieces")]
    InvalidPartition {
        pieces: usize,
        extent: usize,
        axis: usize,
    },

    #[error("Region {region} is not contained in {bounds}")]
    RegionOutOfBounds { region: String, bounds: String },

    #[error("Paste is not supported for this output: {0}")]
    UnsupportedPasteForFormat(String),

    #[error("Image extents differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("Requested region out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Paste target does not exist: {}", .0.display())]
    MissingPasteTarget(PathBuf),

    #[error("Existing image header does not match: {0}")]
    HeaderMismatch(String),

    #[error("Pixel buffer holds {actual} samples, expected {expected}")]
    InvalidBuffer { expected: usize, actual: usize },

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Write cancelled after {written} of {total} pieces")]
    Cancelled { written: usize, total: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
