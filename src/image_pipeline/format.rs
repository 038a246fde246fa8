//! File format dispatch by extension

use std::path::Path;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::producer::PixelProducer;
use crate::image_pipeline::region::Region;
use crate::image_pipeline::tiff::{TiffSinkConfig, TiffStackProducer, TiffStackSink};
use crate::image_pipeline::volume::{VolumeFileProducer, VolumeFileSink};
use crate::image_pipeline::writer::{Sink, SinkCapabilities, SinkPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// `.vol` container
    Volume,
    /// Multi-page `.tif` / `.tiff`
    TiffStack,
}

impl ImageFormat {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "vol" => Ok(ImageFormat::Volume),
            "tif" | "tiff" => Ok(ImageFormat::TiffStack),
            _ => Err(PipelineError::UnsupportedFormat(format!(
                "no image format for {}",
                path.display()
            ))),
        }
    }
}

/// Producer for any supported file format.
pub enum FormatProducer<T: Sample, const D: usize> {
    Volume(VolumeFileProducer<T, D>),
    TiffStack(TiffStackProducer<T, D>),
}

impl<T: Sample, const D: usize> PixelProducer<T, D> for FormatProducer<T, D> {
    fn largest_region(&self) -> Region<D> {
        match self {
            FormatProducer::Volume(p) => p.largest_region(),
            FormatProducer::TiffStack(p) => p.largest_region(),
        }
    }

    fn components(&self) -> usize {
        match self {
            FormatProducer::Volume(p) => p.components(),
            FormatProducer::TiffStack(p) => p.components(),
        }
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        match self {
            FormatProducer::Volume(p) => p.produce(region),
            FormatProducer::TiffStack(p) => p.produce(region),
        }
    }
}

/// Sink for any supported file format.
pub enum FormatSink<const D: usize> {
    Volume(VolumeFileSink<D>),
    TiffStack(TiffStackSink<D>),
}

impl<const D: usize> Sink<D> for FormatSink<D> {
    fn path(&self) -> &Path {
        match self {
            FormatSink::Volume(s) => s.path(),
            FormatSink::TiffStack(s) => s.path(),
        }
    }

    fn capabilities(&self) -> SinkCapabilities {
        match self {
            FormatSink::Volume(s) => s.capabilities(),
            FormatSink::TiffStack(s) => s.capabilities(),
        }
    }

    fn begin(&mut self, plan: &SinkPlan<D>) -> Result<()> {
        match self {
            FormatSink::Volume(s) => s.begin(plan),
            FormatSink::TiffStack(s) => s.begin(plan),
        }
    }

    fn write_at<T: Sample>(
        &mut self,
        region: &Region<D>,
        data: &PixelBuffer<T, D>,
        compressed: bool,
    ) -> Result<()> {
        match self {
            FormatSink::Volume(s) => s.write_at(region, data, compressed),
            FormatSink::TiffStack(s) => s.write_at(region, data, compressed),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            FormatSink::Volume(s) => s.finish(),
            FormatSink::TiffStack(s) => s.finish(),
        }
    }
}

pub fn open_producer<T: Sample, const D: usize>(path: impl AsRef<Path>) -> Result<FormatProducer<T, D>> {
    let path = path.as_ref();
    Ok(match ImageFormat::from_path(path)? {
        ImageFormat::Volume => FormatProducer::Volume(VolumeFileProducer::open(path)?),
        ImageFormat::TiffStack => FormatProducer::TiffStack(TiffStackProducer::open(path)?),
    })
}

pub fn open_sink<const D: usize>(path: impl AsRef<Path>) -> Result<FormatSink<D>> {
    let path = path.as_ref();
    Ok(match ImageFormat::from_path(path)? {
        ImageFormat::Volume => FormatSink::Volume(VolumeFileSink::new(path)),
        ImageFormat::TiffStack => {
            FormatSink::TiffStack(TiffStackSink::with_config(path, TiffSinkConfig::default()))
        }
    })
}

/// Reads a whole image of any supported format.
pub fn read_image<T: Sample, const D: usize>(path: impl AsRef<Path>) -> Result<PixelBuffer<T, D>> {
    let mut producer = open_producer::<T, D>(path)?;
    let region = producer.largest_region();
    producer.produce(&region)
}
