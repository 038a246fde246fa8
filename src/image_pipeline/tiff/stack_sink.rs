use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tiff::encoder::{TiffEncoder, colortype};
use tracing::{debug, info, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, PixelType, Sample};
use crate::image_pipeline::region::Region;
use crate::image_pipeline::tiff::stack_reader::read_pages;
use crate::image_pipeline::tiff::types::{TiffCompression, TiffSinkConfig};
use crate::image_pipeline::writer::{ImageLayout, Sink, SinkCapabilities, SinkMode, SinkPlan};

/// Page geometry of an image laid out as a stack of 2D slices.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StackShape {
    pub width: u32,
    pub height: u32,
    pub pages: usize,
}

impl StackShape {
    pub fn of<const D: usize>(region: &Region<D>) -> Result<Self> {
        if !(2..=3).contains(&D) {
            return Err(PipelineError::UnsupportedFormat(format!(
                "TIFF stacks hold 2D or 3D images, not {D}D"
            )));
        }
        if region.is_empty() {
            return Err(PipelineError::UnsupportedFormat(format!("empty TIFF stack {region}")));
        }
        let dim = |axis: usize| {
            u32::try_from(region.size[axis]).map_err(|_| {
                PipelineError::EncodeError(format!("extent {} too large for TIFF", region.size[axis]))
            })
        };
        Ok(Self {
            width: dim(0)?,
            height: dim(1)?,
            pages: region.size.get(2).copied().unwrap_or(1),
        })
    }

    pub fn page_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

struct Page {
    bytes: Vec<u8>,
    filled: usize,
}

enum State<const D: usize> {
    Idle,
    /// Pages are encoded as soon as every pixel of them has arrived
    Streaming {
        layout: ImageLayout<D>,
        shape: StackShape,
        encoder: TiffEncoder<File>,
        pending: BTreeMap<usize, Page>,
        next_page: usize,
    },
    /// The whole stack is held in memory and encoded on finish
    Staged {
        layout: ImageLayout<D>,
        shape: StackShape,
        payload: Vec<u8>,
        compress: bool,
    },
}

/// Writes multi-page grayscale TIFF files, one page per slice along the
/// third axis.
///
/// Strips are encoded sequentially, so an existing file cannot be patched: a
/// paste always rewrites the whole stack.
pub struct TiffStackSink<const D: usize> {
    path: PathBuf,
    config: TiffSinkConfig,
    state: State<D>,
}

impl<const D: usize> TiffStackSink<D> {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, TiffSinkConfig::default())
    }

    pub fn with_config(path: impl AsRef<Path>, config: TiffSinkConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            state: State::Idle,
        }
    }

    pub fn config(&self) -> &TiffSinkConfig {
        &self.config
    }

    fn open_encoder(&self, compress: bool, pixel_type: PixelType) -> Result<TiffEncoder<File>> {
        let compression = if compress {
            self.config.compression
        } else {
            TiffCompression::None
        };
        let mut encoder = TiffEncoder::new(File::create(&self.path)?)
            .map_err(|e| PipelineError::EncodeError(e.to_string()))?
            .with_compression(compression.to_encoder());
        if compress && pixel_type != PixelType::F32 && self.config.predictor.is_some() {
            encoder = encoder.with_predictor(self.config.encoder_predictor());
        }
        debug!(?compression, "TIFF encoder opened");
        Ok(encoder)
    }

    fn staged_payload(&self, plan: &SinkPlan<D>, shape: &StackShape) -> Result<Vec<u8>> {
        if !self.path.exists() {
            if !plan.create_missing {
                return Err(PipelineError::MissingPasteTarget(self.path.clone()));
            }
            info!(path = %self.path.display(), "Paste target missing, starting from a zero-filled stack");
            return Ok(vec![0; plan.layout.payload_len()]);
        }

        let existing = read_pages(&self.path)?;
        if existing.pixel_type != plan.layout.pixel_type
            || existing.shape.width != shape.width
            || existing.shape.height != shape.height
            || existing.shape.pages != shape.pages
        {
            return Err(PipelineError::HeaderMismatch(format!(
                "{} holds {}x{}x{} {:?}, write expects {}x{}x{} {:?}",
                self.path.display(),
                existing.shape.width,
                existing.shape.height,
                existing.shape.pages,
                existing.pixel_type,
                shape.width,
                shape.height,
                shape.pages,
                plan.layout.pixel_type
            )));
        }
        Ok(existing.bytes)
    }
}

fn encode_page(
    encoder: &mut TiffEncoder<File>,
    pixel_type: PixelType,
    shape: &StackShape,
    bytes: &[u8],
) -> Result<()> {
    let (w, h) = (shape.width, shape.height);
    let written = match pixel_type {
        PixelType::U8 => encoder.write_image::<colortype::Gray8>(w, h, bytes),
        PixelType::U16 => encoder.write_image::<colortype::Gray16>(w, h, &u16::decode_le(bytes)),
        PixelType::F32 => {
            encoder.write_image::<colortype::Gray32Float>(w, h, &f32::decode_le(bytes))
        }
    };
    written.map_err(|e| PipelineError::EncodeError(e.to_string()))
}

impl<const D: usize> Sink<D> for TiffStackSink<D> {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            paste_in_place: false,
            compression: true,
        }
    }

    #[instrument(skip(self, plan), fields(path = %self.path.display()))]
    fn begin(&mut self, plan: &SinkPlan<D>) -> Result<()> {
        if plan.layout.components != 1 {
            return Err(PipelineError::UnsupportedFormat(format!(
                "TIFF stacks hold scalar pixels, got {} components",
                plan.layout.components
            )));
        }
        let shape = StackShape::of(&plan.layout.region)?;

        self.state = match plan.mode {
            SinkMode::Full => State::Streaming {
                layout: plan.layout,
                shape,
                encoder: self.open_encoder(plan.compress, plan.layout.pixel_type)?,
                pending: BTreeMap::new(),
                next_page: 0,
            },
            SinkMode::PasteInPlace { .. } => {
                return Err(PipelineError::UnsupportedPasteForFormat(format!(
                    "{} cannot be patched in place",
                    self.path.display()
                )));
            }
            SinkMode::RewriteWhole { .. } => State::Staged {
                layout: plan.layout,
                shape,
                payload: self.staged_payload(plan, &shape)?,
                compress: plan.compress,
            },
        };
        debug!(pages = shape.pages, "TIFF sink ready");
        Ok(())
    }

    fn write_at<T: Sample>(
        &mut self,
        region: &Region<D>,
        data: &PixelBuffer<T, D>,
        _compressed: bool,
    ) -> Result<()> {
        data.region().ensure_contains(region)?;
        if region.is_empty() {
            return Ok(());
        }
        if data.components() != 1 {
            return Err(PipelineError::UnsupportedFormat(
                "TIFF stacks hold scalar pixels".to_string(),
            ));
        }

        let mut row = Vec::with_capacity(region.size[0] * T::PIXEL_TYPE.size());
        match &mut self.state {
            State::Idle => Err(PipelineError::EncodeError("write before begin".to_string())),
            State::Streaming {
                layout,
                shape,
                encoder,
                pending,
                next_page,
            } => {
                if T::PIXEL_TYPE != layout.pixel_type {
                    return Err(PipelineError::HeaderMismatch(format!(
                        "piece holds {:?}, stack holds {:?}",
                        T::PIXEL_TYPE,
                        layout.pixel_type
                    )));
                }
                layout.region.ensure_contains(region)?;

                let page_bytes = shape.page_pixels() * T::PIXEL_TYPE.size();
                for start in region.row_starts() {
                    let page = match (start.get(2), layout.region.index.get(2)) {
                        (Some(z), Some(z0)) => (z - z0) as usize,
                        _ => 0,
                    };
                    row.clear();
                    T::extend_le(data.row(&start, region.size[0]), &mut row);
                    let offset = layout.byte_offset(&start) - page * page_bytes;
                    let entry = pending.entry(page).or_insert_with(|| Page {
                        bytes: vec![0; page_bytes],
                        filled: 0,
                    });
                    entry.bytes[offset..offset + row.len()].copy_from_slice(&row);
                    entry.filled += region.size[0];
                }

                while pending
                    .get(&*next_page)
                    .is_some_and(|p| p.filled >= shape.page_pixels())
                {
                    if let Some(page) = pending.remove(&*next_page) {
                        encode_page(encoder, layout.pixel_type, shape, &page.bytes)?;
                        debug!(page = *next_page, "TIFF page flushed");
                    }
                    *next_page += 1;
                }
                Ok(())
            }
            State::Staged {
                layout, payload, ..
            } => {
                if T::PIXEL_TYPE != layout.pixel_type {
                    return Err(PipelineError::HeaderMismatch(format!(
                        "piece holds {:?}, stack holds {:?}",
                        T::PIXEL_TYPE,
                        layout.pixel_type
                    )));
                }
                layout.region.ensure_contains(region)?;
                for start in region.row_starts() {
                    row.clear();
                    T::extend_le(data.row(&start, region.size[0]), &mut row);
                    let offset = layout.byte_offset(&start);
                    payload[offset..offset + row.len()].copy_from_slice(&row);
                }
                Ok(())
            }
        }
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn finish(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Ok(()),
            State::Streaming {
                shape, next_page, ..
            } => {
                if next_page != shape.pages {
                    return Err(PipelineError::EncodeError(format!(
                        "only {} of {} pages received",
                        next_page, shape.pages
                    )));
                }
                Ok(())
            }
            State::Staged {
                layout,
                shape,
                payload,
                compress,
            } => {
                let mut encoder = self.open_encoder(compress, layout.pixel_type)?;
                let page_bytes = shape.page_pixels() * layout.pixel_type.size();
                for page in payload.chunks_exact(page_bytes) {
                    encode_page(&mut encoder, layout.pixel_type, &shape, page)?;
                }
                debug!(pages = shape.pages, "TIFF stack rewritten");
                Ok(())
            }
        }
    }
}
