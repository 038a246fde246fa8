use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::producer::PixelProducer;
use crate::image_pipeline::region::Region;
use crate::image_pipeline::volume::header::{self, VolumeHeader};
use crate::image_pipeline::writer::ImageLayout;

enum Source {
    /// Rows are read on demand
    Seekable { file: BufReader<File>, payload_offset: u64 },
    /// Compressed payloads are inflated once on open
    Decoded(Vec<u8>),
}

/// Reads regions of a `.vol` file.
pub struct VolumeFileProducer<T: Sample, const D: usize> {
    path: PathBuf,
    layout: ImageLayout<D>,
    source: Source,
    _sample: PhantomData<T>,
}

impl<T: Sample, const D: usize> VolumeFileProducer<T, D> {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufReader::new(File::open(&path)?);
        let volume = VolumeHeader::read_from(&mut file)?;
        let layout = volume.layout::<D>()?;
        if layout.pixel_type != T::PIXEL_TYPE {
            return Err(PipelineError::HeaderMismatch(format!(
                "file holds {:?} samples, requested {:?}",
                layout.pixel_type,
                T::PIXEL_TYPE
            )));
        }

        let source = if volume.compressed {
            Source::Decoded(header::read_payload(file, &volume)?)
        } else {
            Source::Seekable {
                file,
                payload_offset: volume.encoded_len() as u64,
            }
        };
        debug!(region = %layout.region, components = layout.components, compressed = volume.compressed, "Volume opened");

        Ok(Self {
            path,
            layout,
            source,
            _sample: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &ImageLayout<D> {
        &self.layout
    }
}

impl<T: Sample, const D: usize> PixelProducer<T, D> for VolumeFileProducer<T, D> {
    fn largest_region(&self) -> Region<D> {
        self.layout.region
    }

    fn components(&self) -> usize {
        self.layout.components
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        if !self.layout.region.contains_region(region) {
            return Err(PipelineError::OutOfBounds(format!(
                "{} outside {}",
                region, self.layout.region
            )));
        }
        trace!(%region, "Reading volume region");

        let components = self.layout.components;
        let mut data = Vec::with_capacity(region.num_pixels() * components);
        if region.is_empty() {
            return PixelBuffer::new(*region, components, data);
        }

        let row_len = region.size[0] * components * T::PIXEL_TYPE.size();
        let mut row = vec![0u8; row_len];
        for start in region.row_starts() {
            let offset = self.layout.byte_offset(&start);
            match &mut self.source {
                Source::Seekable {
                    file,
                    payload_offset,
                } => {
                    file.seek(SeekFrom::Start(*payload_offset + offset as u64))?;
                    file.read_exact(&mut row)?;
                    data.extend(T::decode_le(&row));
                }
                Source::Decoded(payload) => {
                    data.extend(T::decode_le(&payload[offset..offset + row_len]));
                }
            }
        }
        PixelBuffer::new(*region, components, data)
    }
}

/// Reads a whole volume file.
pub fn read_volume<T: Sample, const D: usize>(path: impl AsRef<Path>) -> Result<PixelBuffer<T, D>> {
    let mut producer = VolumeFileProducer::<T, D>::open(path)?;
    let region = producer.largest_region();
    producer.produce(&region)
}
