use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::region::Region;
use crate::image_pipeline::volume::header::{self, VolumeHeader};
use crate::image_pipeline::writer::{ImageLayout, Sink, SinkCapabilities, SinkMode, SinkPlan};

enum State<const D: usize> {
    Idle,
    /// Rows are written straight into an uncompressed file
    Direct {
        file: File,
        layout: ImageLayout<D>,
        payload_offset: u64,
    },
    /// The payload is assembled in memory and written on finish
    Staged {
        layout: ImageLayout<D>,
        payload: Vec<u8>,
        compress: bool,
    },
}

/// Writes `.vol` volume files.
///
/// Uncompressed files are patched in place, so a paste only touches the rows
/// of the paste region. Compressed files are always written whole.
pub struct VolumeFileSink<const D: usize> {
    path: PathBuf,
    state: State<D>,
}

impl<const D: usize> VolumeFileSink<D> {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: State::Idle,
        }
    }

    /// Creates the file with a zeroed payload and keeps it open for row writes.
    fn create_direct(&self, layout: ImageLayout<D>) -> Result<State<D>> {
        let header = VolumeHeader::from_layout(&layout, false);
        let encoded = header.encode()?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(&encoded)?;
        file.set_len((encoded.len() + layout.payload_len()) as u64)?;
        Ok(State::Direct {
            file,
            layout,
            payload_offset: encoded.len() as u64,
        })
    }

    fn load_existing(&self, layout: &ImageLayout<D>) -> Result<(VolumeHeader, Vec<u8>)> {
        let mut file = File::open(&self.path)?;
        let existing = VolumeHeader::read_from(&mut file)?;
        existing.ensure_matches(layout)?;
        let payload = header::read_payload(std::io::BufReader::new(file), &existing)?;
        Ok((existing, payload))
    }

    fn open_paste_target(&self, plan: &SinkPlan<D>) -> Result<State<D>> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let existing = VolumeHeader::read_from(&mut file)?;
        existing.ensure_matches(&plan.layout)?;

        if existing.compressed {
            if !plan.rewrite_fallback {
                return Err(PipelineError::UnsupportedPasteForFormat(format!(
                    "{} holds a compressed payload",
                    self.path.display()
                )));
            }
            drop(file);
            info!(path = %self.path.display(), "Existing payload is compressed, rewriting whole file");
            let (_, payload) = self.load_existing(&plan.layout)?;
            return Ok(State::Staged {
                layout: plan.layout,
                payload,
                compress: true,
            });
        }

        Ok(State::Direct {
            file,
            layout: plan.layout,
            payload_offset: existing.encoded_len() as u64,
        })
    }

    fn missing_target(&self, plan: &SinkPlan<D>) -> Result<()> {
        if plan.create_missing {
            info!(path = %self.path.display(), "Paste target missing, starting from a zero-filled image");
            Ok(())
        } else {
            Err(PipelineError::MissingPasteTarget(self.path.clone()))
        }
    }

    fn check_pixels<T: Sample>(layout: &ImageLayout<D>, data: &PixelBuffer<T, D>) -> Result<()> {
        if T::PIXEL_TYPE != layout.pixel_type || data.components() != layout.components {
            return Err(PipelineError::HeaderMismatch(format!(
                "piece holds {:?} x{}, file holds {:?} x{}",
                T::PIXEL_TYPE,
                data.components(),
                layout.pixel_type,
                layout.components
            )));
        }
        Ok(())
    }
}

impl<const D: usize> Sink<D> for VolumeFileSink<D> {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities {
            paste_in_place: true,
            compression: true,
        }
    }

    #[instrument(skip(self, plan), fields(path = %self.path.display()))]
    fn begin(&mut self, plan: &SinkPlan<D>) -> Result<()> {
        let exists = self.path.exists();
        self.state = match plan.mode {
            SinkMode::Full if plan.compress => State::Staged {
                layout: plan.layout,
                payload: vec![0; plan.layout.payload_len()],
                compress: true,
            },
            SinkMode::Full => self.create_direct(plan.layout)?,
            SinkMode::PasteInPlace { .. } if exists => self.open_paste_target(plan)?,
            SinkMode::PasteInPlace { .. } => {
                self.missing_target(plan)?;
                self.create_direct(plan.layout)?
            }
            SinkMode::RewriteWhole { .. } => {
                let payload = if exists {
                    self.load_existing(&plan.layout)?.1
                } else {
                    self.missing_target(plan)?;
                    vec![0; plan.layout.payload_len()]
                };
                State::Staged {
                    layout: plan.layout,
                    payload,
                    compress: plan.compress,
                }
            }
        };
        debug!(mode = ?plan.mode, "Volume sink ready");
        Ok(())
    }

    fn write_at<T: Sample>(
        &mut self,
        region: &Region<D>,
        data: &PixelBuffer<T, D>,
        compressed: bool,
    ) -> Result<()> {
        data.region().ensure_contains(region)?;
        if region.is_empty() {
            return Ok(());
        }

        let mut row = Vec::with_capacity(region.size[0] * data.components() * T::PIXEL_TYPE.size());
        match &mut self.state {
            State::Idle => Err(PipelineError::EncodeError(
                "write before begin".to_string(),
            )),
            State::Direct {
                file,
                layout,
                payload_offset,
            } => {
                if compressed {
                    return Err(PipelineError::EncodeError(
                        "compressed piece sent to an uncompressed file".to_string(),
                    ));
                }
                Self::check_pixels(layout, data)?;
                layout.region.ensure_contains(region)?;
                for start in region.row_starts() {
                    row.clear();
                    T::extend_le(data.row(&start, region.size[0]), &mut row);
                    file.seek(SeekFrom::Start(*payload_offset + layout.byte_offset(&start) as u64))?;
                    file.write_all(&row)?;
                }
                Ok(())
            }
            State::Staged {
                layout, payload, ..
            } => {
                Self::check_pixels(layout, data)?;
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
            State::Direct { file, .. } => {
                file.sync_all()?;
                Ok(())
            }
            State::Staged {
                layout,
                payload,
                compress,
            } => {
                let header = VolumeHeader::from_layout(&layout, compress);
                let mut out = BufWriter::new(File::create(&self.path)?);
                out.write_all(&header.encode()?)?;
                header::write_payload(out, &payload, compress)?;
                debug!(bytes = payload.len(), compress, "Volume payload flushed");
                Ok(())
            }
        }
    }
}

/// Writes `image` to `path` in one piece, replacing any existing file.
pub fn write_volume<T: Sample, const D: usize>(
    path: impl AsRef<Path>,
    image: &PixelBuffer<T, D>,
    compress: bool,
) -> Result<()> {
    let mut sink = VolumeFileSink::new(path);
    sink.begin(&SinkPlan {
        layout: ImageLayout {
            region: *image.region(),
            pixel_type: T::PIXEL_TYPE,
            components: image.components(),
        },
        mode: SinkMode::Full,
        compress,
        create_missing: false,
        rewrite_fallback: false,
    })?;
    sink.write_at(image.region(), image, compress)?;
    sink.finish()
}
