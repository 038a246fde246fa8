use tracing::debug;

use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::producer::reader::PixelProducer;
use crate::image_pipeline::region::Region;

/// Pass-through producer that records every region requested from it.
///
/// Lets callers verify that a write really was streamed in pieces.
pub struct MonitoredProducer<P, const D: usize> {
    inner: P,
    requests: Vec<Region<D>>,
}

impl<P, const D: usize> MonitoredProducer<P, D> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            requests: Vec::new(),
        }
    }

    pub fn number_of_updates(&self) -> usize {
        self.requests.len()
    }

    /// Requested regions, in request order.
    pub fn requests(&self) -> &[Region<D>] {
        &self.requests
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

impl<T: Sample, const D: usize, P: PixelProducer<T, D>> PixelProducer<T, D> for MonitoredProducer<P, D> {
    fn largest_region(&self) -> Region<D> {
        self.inner.largest_region()
    }

    fn components(&self) -> usize {
        self.inner.components()
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        self.requests.push(*region);
        debug!(update = self.requests.len(), %region, "Upstream region requested");
        self.inner.produce(region)
    }
}
