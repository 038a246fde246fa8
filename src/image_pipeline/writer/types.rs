//! Write request and writer configuration types

use crate::image_pipeline::region::{Region, SplitAxis};

/// One streamed write of an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteRequest<const D: usize> {
    /// Region written to the output, usually the producer's largest region
    pub total_region: Region<D>,
    /// Number of pieces the total region is streamed in
    pub number_of_pieces: usize,
    /// When set, only this part of an existing output is overwritten
    pub paste_region: Option<Region<D>>,
    /// Whether the persisted payload is compressed
    pub compress: bool,
}

impl<const D: usize> WriteRequest<D> {
    pub fn builder(total_region: Region<D>) -> WriteRequestBuilder<D> {
        WriteRequestBuilder {
            total_region,
            number_of_pieces: None,
            paste_region: None,
            compress: None,
        }
    }

    /// Whole-image, single-piece, uncompressed write.
    pub fn full(total_region: Region<D>) -> Self {
        Self::builder(total_region).build()
    }

    /// Same request without the paste region.
    pub fn without_paste(&self) -> Self {
        Self {
            paste_region: None,
            ..*self
        }
    }
}

/// Builder for WriteRequest
pub struct WriteRequestBuilder<const D: usize> {
    total_region: Region<D>,
    number_of_pieces: Option<usize>,
    paste_region: Option<Region<D>>,
    compress: Option<bool>,
}

impl<const D: usize> WriteRequestBuilder<D> {
    pub fn pieces(mut self, count: usize) -> Self {
        self.number_of_pieces = Some(count);
        self
    }

    pub fn paste(mut self, region: Option<Region<D>>) -> Self {
        self.paste_region = region;
        self
    }

    pub fn compress(mut self, enable: bool) -> Self {
        self.compress = Some(enable);
        self
    }

    pub fn build(self) -> WriteRequest<D> {
        WriteRequest {
            total_region: self.total_region,
            number_of_pieces: self.number_of_pieces.unwrap_or(1),
            paste_region: self.paste_region,
            compress: self.compress.unwrap_or(false),
        }
    }
}

/// What to do when a paste cannot be applied in place, either because the
/// payload is compressed or because the format has no random access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressedPastePolicy {
    /// Fail with `UnsupportedPasteForFormat`
    #[default]
    Reject,
    /// Load the existing image, paste in memory and rewrite the whole file
    RewriteWhole,
}

/// What to do when pasting into an output that does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasteTargetPolicy {
    /// Fail with `MissingPasteTarget`
    #[default]
    RequireExisting,
    /// Create the output zero-filled, then paste
    CreateZeroFilled,
}

/// Configuration for the streaming writer
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Axis the total region is cut along
    pub split_axis: SplitAxis,
    pub compressed_paste: CompressedPastePolicy,
    pub paste_target: PasteTargetPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            split_axis: SplitAxis::Outermost,
            compressed_paste: CompressedPastePolicy::Reject,
            paste_target: PasteTargetPolicy::RequireExisting,
        }
    }
}

impl WriterConfig {
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }
}

/// Builder for WriterConfig
#[derive(Default)]
pub struct WriterConfigBuilder {
    split_axis: Option<SplitAxis>,
    compressed_paste: Option<CompressedPastePolicy>,
    paste_target: Option<PasteTargetPolicy>,
}

impl WriterConfigBuilder {
    pub fn split_axis(mut self, axis: SplitAxis) -> Self {
        self.split_axis = Some(axis);
        self
    }

    pub fn compressed_paste(mut self, policy: CompressedPastePolicy) -> Self {
        self.compressed_paste = Some(policy);
        self
    }

    pub fn paste_target(mut self, policy: PasteTargetPolicy) -> Self {
        self.paste_target = Some(policy);
        self
    }

    pub fn build(self) -> WriterConfig {
        let default = WriterConfig::default();
        WriterConfig {
            split_axis: self.split_axis.unwrap_or(default.split_axis),
            compressed_paste: self.compressed_paste.unwrap_or(default.compressed_paste),
            paste_target: self.paste_target.unwrap_or(default.paste_target),
        }
    }
}
