use std::path::Path;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::pixel::{PixelBuffer, PixelType, Sample};
use crate::image_pipeline::region::Region;

/// Pixel layout of the persisted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout<const D: usize> {
    pub region: Region<D>,
    pub pixel_type: PixelType,
    pub components: usize,
}

impl<const D: usize> ImageLayout<D> {
    /// Payload size in bytes, uncompressed.
    pub fn payload_len(&self) -> usize {
        self.region.num_pixels() * self.components * self.pixel_type.size()
    }

    /// Byte offset of `index` inside the payload.
    pub fn byte_offset(&self, index: &[i64; D]) -> usize {
        self.region.linear_offset(index) * self.components * self.pixel_type.size()
    }
}

/// How the sink applies the pieces it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode<const D: usize> {
    /// The whole image is written from scratch
    Full,
    /// Only `region` is overwritten, directly in the existing file
    PasteInPlace { region: Region<D> },
    /// The existing image is loaded, `region` is overwritten, and the whole
    /// file is rewritten on finish
    RewriteWhole { region: Region<D> },
}

/// Everything a sink needs to know before the first piece arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkPlan<const D: usize> {
    pub layout: ImageLayout<D>,
    pub mode: SinkMode<D>,
    pub compress: bool,
    /// Create a zero-filled image when pasting into a missing file
    pub create_missing: bool,
    /// An in-place paste may turn into a whole-file rewrite when the existing
    /// payload cannot be patched
    pub rewrite_fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCapabilities {
    /// Sub-regions of an uncompressed image can be overwritten in place
    pub paste_in_place: bool,
    pub compression: bool,
}

/// Persistent destination of a streamed write.
///
/// The writer calls `begin` once, `write_at` once per non-empty piece in
/// partition order, then `finish`.
pub trait Sink<const D: usize> {
    fn path(&self) -> &Path;

    fn capabilities(&self) -> SinkCapabilities;

    fn begin(&mut self, plan: &SinkPlan<D>) -> Result<()>;

    /// Persists the pixels of `region`, which lies inside `data`.
    fn write_at<T: Sample>(
        &mut self,
        region: &Region<D>,
        data: &PixelBuffer<T, D>,
        compressed: bool,
    ) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}
