use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::producer::PixelProducer;
use crate::image_pipeline::region::{Region, RegionPartitioner};
use crate::image_pipeline::writer::cancel::CancelToken;
use crate::image_pipeline::writer::report::{PieceReport, Timer, WriteReport};
use crate::image_pipeline::writer::sink::{ImageLayout, Sink, SinkMode, SinkPlan};
use crate::image_pipeline::writer::types::{
    CompressedPastePolicy, PasteTargetPolicy, WriteRequest, WriterConfig,
};

/// A piece of the partition and the part of it that must be persisted.
struct PieceJob<const D: usize> {
    piece: Region<D>,
    target: Option<Region<D>>,
}

type Produced<T, const D: usize> = (usize, Duration, Result<PixelBuffer<T, D>>);

/// Streams an image from a producer into a sink, piece by piece.
pub struct StreamingWriter {
    config: WriterConfig,
    cancel: CancelToken,
}

impl StreamingWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WriterConfig) {
        self.config = config;
    }

    /// Validates the request and resolves the pieces and the sink plan.
    ///
    /// Nothing is written when this fails.
    fn plan<T: Sample, const D: usize, P: PixelProducer<T, D>, S: Sink<D>>(
        &self,
        request: &WriteRequest<D>,
        producer: &P,
        sink: &S,
    ) -> Result<(Vec<PieceJob<D>>, SinkPlan<D>)> {
        let total = request.total_region;
        producer.largest_region().ensure_contains(&total)?;
        if let Some(paste) = &request.paste_region {
            total.ensure_contains(paste)?;
        }

        let pieces = RegionPartitioner::new(self.config.split_axis)
            .partition(&total, request.number_of_pieces)?;

        let capabilities = sink.capabilities();
        if request.compress && !capabilities.compression {
            return Err(PipelineError::UnsupportedFormat(format!(
                "{} cannot be compressed",
                sink.path().display()
            )));
        }

        let mode = match request.paste_region {
            None => SinkMode::Full,
            Some(region) => {
                let conflict = if request.compress {
                    Some("compression rewrites the whole file")
                } else if !capabilities.paste_in_place {
                    Some("format has no random access")
                } else {
                    None
                };
                match (conflict, self.config.compressed_paste) {
                    (None, _) => SinkMode::PasteInPlace { region },
                    (Some(reason), CompressedPastePolicy::Reject) => {
                        return Err(PipelineError::UnsupportedPasteForFormat(format!(
                            "{}: {}",
                            sink.path().display(),
                            reason
                        )));
                    }
                    (Some(reason), CompressedPastePolicy::RewriteWhole) => {
                        warn!(reason, "Paste falls back to a whole-file rewrite");
                        SinkMode::RewriteWhole { region }
                    }
                }
            }
        };

        let jobs = pieces
            .into_iter()
            .map(|piece| {
                let target = match request.paste_region {
                    Some(paste) => piece.intersect(&paste),
                    None => Some(piece),
                };
                PieceJob { piece, target }
            })
            .collect();

        let plan = SinkPlan {
            layout: ImageLayout {
                region: total,
                pixel_type: T::PIXEL_TYPE,
                components: producer.components(),
            },
            mode,
            compress: request.compress,
            create_missing: self.config.paste_target == PasteTargetPolicy::CreateZeroFilled,
            rewrite_fallback: self.config.compressed_paste == CompressedPastePolicy::RewriteWhole,
        };
        Ok((jobs, plan))
    }

    fn check_cancelled(&self, written: usize, total: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(written, total, "Write cancelled");
            return Err(PipelineError::Cancelled { written, total });
        }
        Ok(())
    }

    fn persist<T: Sample, const D: usize, S: Sink<D>>(
        sink: &mut S,
        target: &Region<D>,
        buffer: &PixelBuffer<T, D>,
        compressed: bool,
    ) -> Result<(u64, Duration)> {
        let _span = tracing::info_span!("persist_piece", region = %target).entered();
        let timer = Timer::start();
        sink.write_at(target, buffer, compressed)?;
        let bytes = (target.num_pixels() * buffer.components() * T::PIXEL_TYPE.size()) as u64;
        Ok((bytes, timer.stop()))
    }

    fn finish<const D: usize, S: Sink<D>>(sink: &mut S, report: &mut WriteReport<D>) -> Result<()> {
        let _span = tracing::info_span!("finish_output").entered();
        let timer = Timer::start();
        sink.finish()?;
        report.set_finish(timer.stop());
        Ok(())
    }

    /// Writes `request` piece by piece: each piece is produced, then
    /// persisted, before the next one is requested.
    #[instrument(skip(self, producer, sink), fields(output = %sink.path().display()))]
    pub fn write<T, P, S, const D: usize>(
        &self,
        request: &WriteRequest<D>,
        producer: &mut P,
        sink: &mut S,
    ) -> Result<WriteReport<D>>
    where
        T: Sample,
        P: PixelProducer<T, D>,
        S: Sink<D>,
    {
        let (jobs, plan) = self.plan::<T, D, P, S>(request, producer, sink)?;
        info!(
            pieces = jobs.len(),
            compress = request.compress,
            paste = request.paste_region.is_some(),
            "Starting streamed write"
        );

        sink.begin(&plan)?;

        let total = jobs.len();
        let mut report = WriteReport::new();
        for (i, job) in jobs.iter().enumerate() {
            self.check_cancelled(report.pieces_written(), total)?;

            let Some(target) = job.target else {
                debug!(piece = i, region = %job.piece, "Piece outside paste region, skipped");
                report.add_piece(PieceReport {
                    piece: job.piece,
                    written: None,
                    bytes: 0,
                    produce: Duration::ZERO,
                    persist: Duration::ZERO,
                });
                continue;
            };

            let (buffer, produce) = {
                let _span = tracing::info_span!("produce_piece", piece = i, region = %target).entered();
                let timer = Timer::start();
                let buffer = producer.produce(&target)?;
                (buffer, timer.stop())
            };

            let (bytes, persist) = Self::persist(sink, &target, &buffer, request.compress)?;
            debug!(piece = i, bytes, "Piece written");
            report.add_piece(PieceReport {
                piece: job.piece,
                written: Some(target),
                bytes,
                produce,
                persist,
            });
        }

        Self::finish(sink, &mut report)?;
        info!(
            written = report.pieces_written(),
            bytes = report.bytes_written(),
            "Streamed write complete"
        );
        Ok(report)
    }

    /// Like [`write`](Self::write), but produces the next piece on a worker
    /// thread while the current one is persisted.
    ///
    /// Pieces still reach the sink strictly in partition order.
    #[instrument(skip(self, producer, sink), fields(output = %sink.path().display()))]
    pub fn write_pipelined<T, P, S, const D: usize>(
        &self,
        request: &WriteRequest<D>,
        producer: &mut P,
        sink: &mut S,
    ) -> Result<WriteReport<D>>
    where
        T: Sample,
        P: PixelProducer<T, D> + Send,
        S: Sink<D>,
    {
        let (jobs, plan) = self.plan::<T, D, P, S>(request, producer, sink)?;
        info!(pieces = jobs.len(), "Starting pipelined write");

        sink.begin(&plan)?;

        let total = jobs.len();
        let targets: Vec<(usize, Region<D>)> = jobs
            .iter()
            .enumerate()
            .filter_map(|(i, job)| job.target.map(|t| (i, t)))
            .collect();
        let cancel = self.cancel.clone();

        let mut report = WriteReport::new();
        std::thread::scope(|scope| -> Result<()> {
            let (tx, rx) = mpsc::sync_channel::<Produced<T, D>>(1);

            scope.spawn(move || {
                for (i, target) in targets {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let timer = Timer::start();
                    let produced = producer.produce(&target);
                    let failed = produced.is_err();
                    if tx.send((i, timer.stop(), produced)).is_err() || failed {
                        break;
                    }
                }
            });

            let mut pending: BTreeMap<usize, (Duration, PixelBuffer<T, D>)> = BTreeMap::new();
            let mut received = rx.iter();

            for (i, job) in jobs.iter().enumerate() {
                self.check_cancelled(report.pieces_written(), total)?;

                let Some(target) = job.target else {
                    report.add_piece(PieceReport {
                        piece: job.piece,
                        written: None,
                        bytes: 0,
                        produce: Duration::ZERO,
                        persist: Duration::ZERO,
                    });
                    continue;
                };

                while !pending.contains_key(&i) {
                    match received.next() {
                        Some((index, produce, produced)) => {
                            pending.insert(index, (produce, produced?));
                        }
                        None => {
                            return Err(PipelineError::Cancelled {
                                written: report.pieces_written(),
                                total,
                            });
                        }
                    }
                }
                let Some((produce, buffer)) = pending.remove(&i) else {
                    continue;
                };

                let (bytes, persist) = Self::persist(sink, &target, &buffer, request.compress)?;
                debug!(piece = i, bytes, "Piece written");
                report.add_piece(PieceReport {
                    piece: job.piece,
                    written: Some(target),
                    bytes,
                    produce,
                    persist,
                });
            }
            Ok(())
        })?;

        Self::finish(sink, &mut report)?;
        info!(
            written = report.pieces_written(),
            bytes = report.bytes_written(),
            "Pipelined write complete"
        );
        Ok(report)
    }

    /// Discards a possibly half-written output and writes the full image
    /// again, without the paste region.
    #[instrument(skip(self, producer, sink), fields(output = %sink.path().display()))]
    pub fn recover_with_full_write<T, P, S, const D: usize>(
        &self,
        request: &WriteRequest<D>,
        producer: &mut P,
        sink: &mut S,
    ) -> Result<WriteReport<D>>
    where
        T: Sample,
        P: PixelProducer<T, D>,
        S: Sink<D>,
    {
        let path = sink.path().to_path_buf();
        if sink.exists(&path) {
            warn!(path = %path.display(), "Removing indeterminate output");
            sink.remove(&path)?;
        }
        self.write(&request.without_paste(), producer, sink)
    }
}

impl Default for StreamingWriter {
    fn default() -> Self {
        Self::new(WriterConfig::default())
    }
}
