#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use crate::image_pipeline::common::error::{PipelineError, Result};
    use crate::image_pipeline::pixel::{PixelBuffer, Sample};
    use crate::image_pipeline::producer::{InMemoryProducer, MonitoredProducer, PixelProducer};
    use crate::image_pipeline::region::{Region, SplitAxis};
    use crate::image_pipeline::writer::{
        CancelToken, CompressedPastePolicy, PasteTargetPolicy, Sink, SinkCapabilities, SinkMode,
        SinkPlan, StreamingWriter, WriteRequest, WriterConfig,
    };

    struct Recorded<const D: usize> {
        plans: Vec<SinkPlan<D>>,
        writes: Vec<(Region<D>, Vec<u8>, bool)>,
        finished: bool,
    }

    struct MockSink<const D: usize> {
        path: PathBuf,
        capabilities: SinkCapabilities,
        fail_on_write: Option<usize>,
        recorded: Arc<Mutex<Recorded<D>>>,
    }

    impl<const D: usize> MockSink<D> {
        fn new() -> Self {
            Self {
                path: PathBuf::from("mock.vol"),
                capabilities: SinkCapabilities {
                    paste_in_place: true,
                    compression: true,
                },
                fail_on_write: None,
                recorded: Arc::new(Mutex::new(Recorded {
                    plans: Vec::new(),
                    writes: Vec::new(),
                    finished: false,
                })),
            }
        }
    }

    impl<const D: usize> Sink<D> for MockSink<D> {
        fn path(&self) -> &Path {
            &self.path
        }

        fn capabilities(&self) -> SinkCapabilities {
            self.capabilities
        }

        fn begin(&mut self, plan: &SinkPlan<D>) -> Result<()> {
            self.recorded.lock().unwrap().plans.push(*plan);
            Ok(())
        }

        fn write_at<T: Sample>(
            &mut self,
            region: &Region<D>,
            data: &PixelBuffer<T, D>,
            compressed: bool,
        ) -> Result<()> {
            let mut recorded = self.recorded.lock().unwrap();
            if self.fail_on_write == Some(recorded.writes.len()) {
                return Err(PipelineError::IoError(std::io::Error::other("Mock write error")));
            }
            let mut bytes = Vec::new();
            T::extend_le(data.extract(region)?.data(), &mut bytes);
            recorded.writes.push((*region, bytes, compressed));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.recorded.lock().unwrap().finished = true;
            Ok(())
        }
    }

    /// Producer that fails or cancels after a number of calls.
    struct ScriptedProducer {
        inner: InMemoryProducer<u8, 3>,
        calls: usize,
        fail_at: Option<usize>,
        cancel_at: Option<(usize, CancelToken)>,
    }

    impl PixelProducer<u8, 3> for ScriptedProducer {
        fn largest_region(&self) -> Region<3> {
            self.inner.largest_region()
        }

        fn produce(&mut self, region: &Region<3>) -> Result<PixelBuffer<u8, 3>> {
            self.calls += 1;
            if self.fail_at == Some(self.calls) {
                return Err(PipelineError::OutOfBounds("Mock produce error".to_string()));
            }
            if let Some((at, token)) = &self.cancel_at {
                if *at == self.calls {
                    token.cancel();
                }
            }
            self.inner.produce(region)
        }
    }

    fn volume() -> PixelBuffer<u8, 3> {
        PixelBuffer::from_fn(Region::from_size([30, 30, 30]), |[x, y, z]| {
            ((x + 3 * y + 7 * z) % 251) as u8
        })
    }

    fn scripted() -> ScriptedProducer {
        ScriptedProducer {
            inner: InMemoryProducer::new(volume()),
            calls: 0,
            fail_at: None,
            cancel_at: None,
        }
    }

    fn middle_paste() -> Region<3> {
        Region::new([10, 10, 10], [10, 10, 1])
    }

    #[test]
    fn test_config_builder() {
        let config = WriterConfig::builder()
            .split_axis(SplitAxis::Largest)
            .compressed_paste(CompressedPastePolicy::RewriteWhole)
            .paste_target(PasteTargetPolicy::CreateZeroFilled)
            .build();

        assert_eq!(config.split_axis, SplitAxis::Largest);
        assert_eq!(config.compressed_paste, CompressedPastePolicy::RewriteWhole);
        assert_eq!(config.paste_target, PasteTargetPolicy::CreateZeroFilled);

        let default = WriterConfig::builder().build();
        assert_eq!(default.split_axis, SplitAxis::Outermost);
        assert_eq!(default.compressed_paste, CompressedPastePolicy::Reject);
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = WriteRequest::builder(Region::from_size([4, 4])).build();
        assert_eq!(request.number_of_pieces, 1);
        assert_eq!(request.paste_region, None);
        assert!(!request.compress);
    }

    #[test]
    fn test_full_write_streams_every_piece() {
        let mut producer = MonitoredProducer::new(InMemoryProducer::new(volume()));
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let report = StreamingWriter::default()
            .write(&request, &mut producer, &mut sink)
            .unwrap();

        assert_eq!(producer.number_of_updates(), 10);
        assert_eq!(report.pieces_written(), 10);
        assert_eq!(report.bytes_written(), 27_000);

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.plans[0].mode, SinkMode::Full);
        assert!(recorded.finished);
        let starts: Vec<i64> = recorded.writes.iter().map(|(r, _, _)| r.index[2]).collect();
        assert_eq!(starts, vec![0, 3, 6, 9, 12, 15, 18, 21, 24, 27]);
    }

    #[test]
    fn test_writer_config_accessors() {
        let token = CancelToken::new();
        let mut writer = StreamingWriter::default().with_cancel_token(token.clone());
        assert_eq!(writer.config().split_axis, SplitAxis::Outermost);

        writer.set_config(WriterConfig::builder().split_axis(SplitAxis::Largest).build());
        assert_eq!(writer.config().split_axis, SplitAxis::Largest);

        token.cancel();
        assert!(writer.cancel_token().is_cancelled());
    }

    #[test]
    fn test_monitor_cleared_between_writes() {
        let mut producer = MonitoredProducer::new(InMemoryProducer::new(volume()));
        let writer = StreamingWriter::default();
        let full = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        writer.write(&full, &mut producer, &mut MockSink::new()).unwrap();
        assert_eq!(producer.number_of_updates(), 10);

        producer.clear();
        let paste = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(10)
            .paste(Some(middle_paste()))
            .build();
        writer.write(&paste, &mut producer, &mut MockSink::new()).unwrap();
        assert_eq!(producer.requests(), &[middle_paste()]);
    }

    #[test]
    fn test_paste_writes_only_intersecting_pieces() {
        let mut producer = MonitoredProducer::new(InMemoryProducer::new(volume()));
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(10)
            .paste(Some(middle_paste()))
            .build();
        let report = StreamingWriter::default()
            .write(&request, &mut producer, &mut sink)
            .unwrap();

        assert_eq!(producer.requests(), &[middle_paste()]);
        assert_eq!(report.pieces().len(), 10);
        assert_eq!(report.pieces_written(), 1);

        let recorded = recorded.lock().unwrap();
        assert_eq!(
            recorded.plans[0].mode,
            SinkMode::PasteInPlace {
                region: middle_paste()
            }
        );
        let (region, bytes, compressed) = &recorded.writes[0];
        assert_eq!(*region, middle_paste());
        assert_eq!(bytes.len(), 100);
        assert!(!compressed);
    }

    #[test]
    fn test_paste_outside_total_region_rejected() {
        let image = PixelBuffer::filled(Region::from_size([10, 10]), 1, 7u8);
        let mut producer = InMemoryProducer::new(image);
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([10, 10]))
            .paste(Some(Region::new([5, 5], [15, 15])))
            .build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);

        assert!(matches!(result, Err(PipelineError::RegionOutOfBounds { .. })));
        assert!(recorded.lock().unwrap().plans.is_empty());
    }

    #[test]
    fn test_total_region_outside_producer_rejected() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        let request = WriteRequest::full(Region::from_size([31, 30, 30]));
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);
        assert!(matches!(result, Err(PipelineError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn test_zero_pieces_rejected() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(0).build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);
        assert!(matches!(result, Err(PipelineError::InvalidPartition { pieces: 0, .. })));
    }

    #[test]
    fn test_compressed_paste_rejected_by_default() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .paste(Some(middle_paste()))
            .compress(true)
            .build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);
        assert!(matches!(result, Err(PipelineError::UnsupportedPasteForFormat(_))));
    }

    #[test]
    fn test_compressed_paste_rewrite_policy() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let config = WriterConfig::builder()
            .compressed_paste(CompressedPastePolicy::RewriteWhole)
            .build();
        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(5)
            .paste(Some(middle_paste()))
            .compress(true)
            .build();
        StreamingWriter::new(config)
            .write(&request, &mut producer, &mut sink)
            .unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(
            recorded.plans[0].mode,
            SinkMode::RewriteWhole {
                region: middle_paste()
            }
        );
        assert!(recorded.plans[0].compress);
        assert!(recorded.writes.iter().all(|(_, _, compressed)| *compressed));
    }

    #[test]
    fn test_paste_without_random_access_rejected() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        sink.capabilities.paste_in_place = false;
        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .paste(Some(middle_paste()))
            .build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);
        assert!(matches!(result, Err(PipelineError::UnsupportedPasteForFormat(_))));
    }

    #[test]
    fn test_producer_failure_propagates() {
        let mut producer = scripted();
        producer.fail_at = Some(4);
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);

        assert!(matches!(result, Err(PipelineError::OutOfBounds(_))));
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.writes.len(), 3);
        assert!(!recorded.finished);
    }

    #[test]
    fn test_sink_failure_propagates() {
        let mut producer = InMemoryProducer::new(volume());
        let mut sink = MockSink::new();
        sink.fail_on_write = Some(2);
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let result = StreamingWriter::default().write(&request, &mut producer, &mut sink);
        assert!(matches!(result, Err(PipelineError::IoError(_))));
    }

    #[test]
    fn test_cancel_between_pieces() {
        let token = CancelToken::new();
        let mut producer = scripted();
        producer.cancel_at = Some((3, token.clone()));
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let writer = StreamingWriter::default().with_cancel_token(token);
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let result = writer.write(&request, &mut producer, &mut sink);

        assert!(matches!(
            result,
            Err(PipelineError::Cancelled { written: 3, total: 10 })
        ));
        assert_eq!(recorded.lock().unwrap().writes.len(), 3);
    }

    #[test]
    fn test_cancel_counts_only_persisted_pieces() {
        let token = CancelToken::new();
        let mut producer = scripted();
        producer.cancel_at = Some((1, token.clone()));
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let writer = StreamingWriter::default().with_cancel_token(token);
        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(10)
            .paste(Some(middle_paste()))
            .build();
        let result = writer.write(&request, &mut producer, &mut sink);

        assert!(matches!(
            result,
            Err(PipelineError::Cancelled { written: 1, total: 10 })
        ));
        assert_eq!(recorded.lock().unwrap().writes.len(), 1);
    }

    #[test]
    fn test_pipelined_cancel_stops_both_sides() {
        let token = CancelToken::new();
        let mut producer = scripted();
        producer.cancel_at = Some((3, token.clone()));
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let writer = StreamingWriter::default().with_cancel_token(token);
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let result = writer.write_pipelined(&request, &mut producer, &mut sink);

        let Err(PipelineError::Cancelled { written, total }) = &result else {
            panic!("expected cancellation, got {result:?}");
        };
        assert_eq!(*total, 10);
        let writes = recorded.lock().unwrap().writes.len();
        assert_eq!(writes, *written);
        assert!(writes <= 3);
        assert!(producer.calls <= 4);
        assert!(!recorded.lock().unwrap().finished);
    }

    #[test]
    fn test_pipelined_matches_sequential() {
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(7).build();

        let mut sequential_sink = MockSink::new();
        let sequential = sequential_sink.recorded.clone();
        StreamingWriter::default()
            .write(&request, &mut InMemoryProducer::new(volume()), &mut sequential_sink)
            .unwrap();

        let mut pipelined_sink = MockSink::new();
        let pipelined = pipelined_sink.recorded.clone();
        let report = StreamingWriter::default()
            .write_pipelined(&request, &mut InMemoryProducer::new(volume()), &mut pipelined_sink)
            .unwrap();

        assert_eq!(report.pieces_written(), 7);
        assert_eq!(sequential.lock().unwrap().writes, pipelined.lock().unwrap().writes);
        assert!(pipelined.lock().unwrap().finished);
    }

    #[test]
    fn test_pipelined_paste_skips_pieces() {
        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(10)
            .paste(Some(Region::new([0, 0, 5], [30, 30, 10])))
            .build();
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();
        let report = StreamingWriter::default()
            .write_pipelined(&request, &mut InMemoryProducer::new(volume()), &mut sink)
            .unwrap();

        assert_eq!(report.pieces_written(), 4);
        let zs: Vec<(i64, usize)> = recorded
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|(r, _, _)| (r.index[2], r.size[2]))
            .collect();
        assert_eq!(zs, vec![(5, 1), (6, 3), (9, 3), (12, 3)]);
    }

    #[test]
    fn test_pipelined_producer_failure() {
        let mut producer = scripted();
        producer.fail_at = Some(2);
        let mut sink = MockSink::new();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(10).build();
        let result = StreamingWriter::default().write_pipelined(&request, &mut producer, &mut sink);

        assert!(matches!(result, Err(PipelineError::OutOfBounds(_))));
        assert_eq!(recorded.lock().unwrap().writes.len(), 1);
    }

    #[test]
    fn test_pipelined_sink_failure_does_not_hang() {
        let mut sink = MockSink::new();
        sink.fail_on_write = Some(0);
        let request = WriteRequest::builder(Region::from_size([30, 30, 30])).pieces(30).build();
        let result = StreamingWriter::default().write_pipelined(
            &request,
            &mut InMemoryProducer::new(volume()),
            &mut sink,
        );
        assert!(matches!(result, Err(PipelineError::IoError(_))));
    }

    #[test]
    fn test_recover_with_full_write_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.vol");
        std::fs::write(&path, b"half written").unwrap();

        let mut sink = MockSink::new();
        sink.path = path.clone();
        let recorded = sink.recorded.clone();

        let request = WriteRequest::builder(Region::from_size([30, 30, 30]))
            .pieces(3)
            .paste(Some(middle_paste()))
            .build();
        StreamingWriter::default()
            .recover_with_full_write(&request, &mut InMemoryProducer::new(volume()), &mut sink)
            .unwrap();

        assert!(!path.exists());
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.plans[0].mode, SinkMode::Full);
        assert_eq!(recorded.writes.len(), 3);
    }
}
