use crate::image_pipeline::common::error::Result;
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::region::Region;

/// Upstream stage that materializes pixels on demand.
pub trait PixelProducer<T: Sample, const D: usize> {
    /// Full extent of the image this producer can deliver.
    fn largest_region(&self) -> Region<D>;

    /// Samples per pixel
    fn components(&self) -> usize {
        1
    }

    /// Materializes `region`, which must lie inside `largest_region()`.
    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>>;
}

impl<T: Sample, const D: usize, P: PixelProducer<T, D> + ?Sized> PixelProducer<T, D> for &mut P {
    fn largest_region(&self) -> Region<D> {
        (**self).largest_region()
    }

    fn components(&self) -> usize {
        (**self).components()
    }

    fn produce(&mut self, region: &Region<D>) -> Result<PixelBuffer<T, D>> {
        (**self).produce(region)
    }
}
