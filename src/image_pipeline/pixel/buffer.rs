use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::sample::Sample;
use crate::image_pipeline::region::Region;

/// Dense pixel data covering a region.
///
/// Samples are stored with dimension 0 fastest and the `components` samples of
/// one pixel adjacent to each other.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer<T: Sample, const D: usize> {
    region: Region<D>,
    components: usize,
    data: Vec<T>,
}

impl<T: Sample, const D: usize> PixelBuffer<T, D> {
    pub fn new(region: Region<D>, components: usize, data: Vec<T>) -> Result<Self> {
        let expected = region.num_pixels() * components;
        if components == 0 || data.len() != expected {
            return Err(PipelineError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            region,
            components,
            data,
        })
    }

    pub fn filled(region: Region<D>, components: usize, value: T) -> Self {
        Self {
            region,
            components: components.max(1),
            data: vec![value; region.num_pixels() * components.max(1)],
        }
    }

    /// Builds a scalar buffer by evaluating `f` at every index.
    pub fn from_fn(region: Region<D>, mut f: impl FnMut([i64; D]) -> T) -> Self {
        let data = region.indices().map(&mut f).collect();
        Self {
            region,
            components: 1,
            data,
        }
    }

    pub fn region(&self) -> &Region<D> {
        &self.region
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn pixel(&self, index: &[i64; D]) -> Option<&[T]> {
        if !self.region.contains_index(index) {
            return None;
        }
        let start = self.region.linear_offset(index) * self.components;
        Some(&self.data[start..start + self.components])
    }

    pub fn pixel_mut(&mut self, index: &[i64; D]) -> Option<&mut [T]> {
        if !self.region.contains_index(index) {
            return None;
        }
        let start = self.region.linear_offset(index) * self.components;
        Some(&mut self.data[start..start + self.components])
    }

    /// Samples of the row starting at `start` and spanning `len` pixels along
    /// dimension 0. The row must lie inside the buffer.
    pub(crate) fn row(&self, start: &[i64; D], len: usize) -> &[T] {
        let offset = self.region.linear_offset(start) * self.components;
        &self.data[offset..offset + len * self.components]
    }

    /// Copy of the pixels inside `sub`.
    pub fn extract(&self, sub: &Region<D>) -> Result<PixelBuffer<T, D>> {
        self.region.ensure_contains(sub)?;
        let mut data = Vec::with_capacity(sub.num_pixels() * self.components);
        if !sub.is_empty() {
            for start in sub.row_starts() {
                data.extend_from_slice(self.row(&start, sub.size[0]));
            }
        }
        PixelBuffer::new(*sub, self.components, data)
    }

    /// Overwrites the pixels of `region` with the same pixels from `src`.
    pub fn paste_from(&mut self, src: &PixelBuffer<T, D>, region: &Region<D>) -> Result<()> {
        self.region.ensure_contains(region)?;
        src.region.ensure_contains(region)?;
        if src.components != self.components {
            return Err(PipelineError::ShapeMismatch {
                left: vec![self.components],
                right: vec![src.components],
            });
        }
        if region.is_empty() {
            return Ok(());
        }
        let row_len = region.size[0] * self.components;
        for start in region.row_starts() {
            let dst = self.region.linear_offset(&start) * self.components;
            self.data[dst..dst + row_len].copy_from_slice(src.row(&start, region.size[0]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> PixelBuffer<u8, 2> {
        PixelBuffer::from_fn(Region::new([2, 3], [4, 3]), |[x, y]| (x * 10 + y) as u8)
    }

    #[test]
    fn test_new_checks_length() {
        let result = PixelBuffer::<u16, 2>::new(Region::from_size([2, 2]), 3, vec![0; 11]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidBuffer { expected: 12, actual: 11 })
        ));
    }

    #[test]
    fn test_pixel_lookup() {
        let buf = ramp();
        assert_eq!(buf.pixel(&[3, 4]), Some(&[34u8][..]));
        assert_eq!(buf.pixel(&[0, 0]), None);
    }

    #[test]
    fn test_extract() {
        let buf = ramp();
        let sub = buf.extract(&Region::new([3, 4], [2, 2])).unwrap();
        assert_eq!(sub.data(), &[34, 44, 35, 45]);
        assert!(buf.extract(&Region::new([0, 0], [2, 2])).is_err());
    }

    #[test]
    fn test_paste_from() {
        let mut dst = PixelBuffer::filled(Region::new([2, 3], [4, 3]), 1, 0u8);
        let src = ramp();
        dst.paste_from(&src, &Region::new([4, 4], [2, 1])).unwrap();
        assert_eq!(dst.pixel(&[4, 4]), Some(&[44u8][..]));
        assert_eq!(dst.pixel(&[5, 4]), Some(&[54u8][..]));
        assert_eq!(dst.pixel(&[3, 4]), Some(&[0u8][..]));
    }

    #[test]
    fn test_multi_component_pixels() {
        let mut buf = PixelBuffer::filled(Region::from_size([2, 2]), 3, 0.0f32);
        buf.pixel_mut(&[1, 1]).unwrap().copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(buf.data()[9..12], [1.0, 2.0, 3.0]);
    }
}
