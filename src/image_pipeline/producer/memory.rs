use tracing::trace;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::producer::reader::PixelProducer;
use crate::image_pipeline::region::Region;

/// Serves regions out of an image held in memory.
pub struct InMemoryProducer<T: Sample, const D: usize> {
    image: PixelBuffer<T, D>,
}

impl<T: Sample, const D: usize> InMemoryProducer<T, D> {
    pub fn new(image: PixelBuffer<T, D>) -> Self {
        Self { image }
    }
}

impl<T: Sample, const D: usize> PixelProducer<T, D> for InMemoryProducer<T, D> {
    fn largest_region(&self) -> Region<D> {
        *self.image.region()
    }

    fn components(&self) -> usize {
        self.image.components()
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        trace!(%region, "Extracting region from memory");
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
