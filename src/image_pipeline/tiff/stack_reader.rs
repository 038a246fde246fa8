use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, instrument, trace};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, PixelType, Sample};
use crate::image_pipeline::producer::PixelProducer;
use crate::image_pipeline::region::Region;
use crate::image_pipeline::tiff::stack_sink::StackShape;

/// Every page of a TIFF file, as little-endian sample bytes.
pub(crate) struct StackPages {
    pub pixel_type: PixelType,
    pub shape: StackShape,
    pub bytes: Vec<u8>,
}

fn decode_err(e: tiff::TiffError) -> PipelineError {
    PipelineError::DecodeError(e.to_string())
}

pub(crate) fn read_pages(path: &Path) -> Result<StackPages> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?)).map_err(decode_err)?;
    let mut stack: Option<StackPages> = None;

    loop {
        match decoder.colortype().map_err(decode_err)? {
            ColorType::Gray(_) => {}
            other => {
                return Err(PipelineError::UnsupportedFormat(format!(
                    "TIFF color type {other:?}"
                )));
            }
        }
        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let (pixel_type, bytes) = match decoder.read_image().map_err(decode_err)? {
            DecodingResult::U8(data) => (PixelType::U8, data),
            DecodingResult::U16(data) => {
                let mut bytes = Vec::new();
                u16::extend_le(&data, &mut bytes);
                (PixelType::U16, bytes)
            }
            DecodingResult::F32(data) => {
                let mut bytes = Vec::new();
                f32::extend_le(&data, &mut bytes);
                (PixelType::F32, bytes)
            }
            _ => {
                return Err(PipelineError::UnsupportedFormat(
                    "TIFF sample format".to_string(),
                ));
            }
        };

        match stack.as_mut() {
            None => {
                stack = Some(StackPages {
                    pixel_type,
                    shape: StackShape {
                        width,
                        height,
                        pages: 1,
                    },
                    bytes,
                });
            }
            Some(stack) => {
                if stack.pixel_type != pixel_type
                    || stack.shape.width != width
                    || stack.shape.height != height
                {
                    return Err(PipelineError::DecodeError(format!(
                        "page {} is {}x{} {:?}, first page is {}x{} {:?}",
                        stack.shape.pages,
                        width,
                        height,
                        pixel_type,
                        stack.shape.width,
                        stack.shape.height,
                        stack.pixel_type
                    )));
                }
                stack.shape.pages += 1;
                stack.bytes.extend_from_slice(&bytes);
            }
        }

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(decode_err)?;
    }

    stack.ok_or_else(|| PipelineError::DecodeError("TIFF holds no pages".to_string()))
}

/// Reads a whole TIFF stack into a buffer with origin zero.
///
/// 2D images must hold exactly one page.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_tiff_stack<T: Sample, const D: usize>(path: impl AsRef<Path>) -> Result<PixelBuffer<T, D>> {
    if !(2..=3).contains(&D) {
        return Err(PipelineError::UnsupportedFormat(format!(
            "TIFF stacks hold 2D or 3D images, not {D}D"
        )));
    }
    let stack = read_pages(path.as_ref())?;
    if stack.pixel_type != T::PIXEL_TYPE {
        return Err(PipelineError::HeaderMismatch(format!(
            "file holds {:?} samples, requested {:?}",
            stack.pixel_type,
            T::PIXEL_TYPE
        )));
    }

    let mut size = [1usize; D];
    size[0] = stack.shape.width as usize;
    size[1] = stack.shape.height as usize;
    match size.get_mut(2) {
        Some(depth) => *depth = stack.shape.pages,
        None if stack.shape.pages > 1 => {
            return Err(PipelineError::DecodeError(format!(
                "{} pages found in a 2D image",
                stack.shape.pages
            )));
        }
        None => {}
    }
    debug!(?size, "TIFF stack decoded");
    PixelBuffer::new(Region::from_size(size), 1, T::decode_le(&stack.bytes))
}

/// Serves regions of a TIFF stack.
///
/// TIFF strips are not randomly accessible here, so the stack is decoded once
/// on open.
pub struct TiffStackProducer<T: Sample, const D: usize> {
    image: PixelBuffer<T, D>,
}

impl<T: Sample, const D: usize> TiffStackProducer<T, D> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            image: read_tiff_stack(path)?,
        })
    }
}

impl<T: Sample, const D: usize> PixelProducer<T, D> for TiffStackProducer<T, D> {
    fn largest_region(&self) -> Region<D> {
        *self.image.region()
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        trace!(%region, "Extracting region from TIFF stack");
        if !self.image.region().contains_region(region) {
            return Err(PipelineError::OutOfBounds(format!(
                "{} outside {}",
                region,
                self.image.region()
            )));
        }
        self.image.extract(region)
    }
}
