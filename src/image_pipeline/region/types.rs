//! N-dimensional index-space regions

use std::fmt;

use crate::image_pipeline::common::error::{PipelineError, Result};

/// An axis-aligned box in image index space.
///
/// Dimension 0 is the fastest varying one in every buffer and file this crate
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region<const D: usize> {
    /// First index on each axis
    pub index: [i64; D],
    /// Number of pixels on each axis
    pub size: [usize; D],
}

impl<const D: usize> Region<D> {
    pub fn new(index: [i64; D], size: [usize; D]) -> Self {
        Self { index, size }
    }

    /// Region starting at the origin.
    pub fn from_size(size: [usize; D]) -> Self {
        Self {
            index: [0; D],
            size,
        }
    }

    /// One past the last index on `axis`.
    pub fn upper(&self, axis: usize) -> i64 {
        self.index[axis] + self.size[axis] as i64
    }

    pub fn num_pixels(&self) -> usize {
        self.size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    pub fn contains_index(&self, index: &[i64; D]) -> bool {
        (0..D).all(|d| index[d] >= self.index[d] && index[d] < self.upper(d))
    }

    pub fn contains_region(&self, other: &Region<D>) -> bool {
        (0..D).all(|d| other.index[d] >= self.index[d] && other.upper(d) <= self.upper(d))
    }

    /// Returns the overlap of both regions, or `None` when they do not overlap.
    pub fn intersect(&self, other: &Region<D>) -> Option<Region<D>> {
        let mut out = Region::from_size([0; D]);
        for d in 0..D {
            let lo = self.index[d].max(other.index[d]);
            let hi = self.upper(d).min(other.upper(d));
            if hi <= lo {
                return None;
            }
            out.index[d] = lo;
            out.size[d] = (hi - lo) as usize;
        }
        Some(out)
    }

    /// Fails with `RegionOutOfBounds` unless `other` lies inside `self`.
    pub fn ensure_contains(&self, other: &Region<D>) -> Result<()> {
        if self.contains_region(other) {
            Ok(())
        } else {
            Err(PipelineError::RegionOutOfBounds {
                region: other.to_string(),
                bounds: self.to_string(),
            })
        }
    }

    /// Sample offset of `index` in a dense buffer laid out over this region,
    /// counting pixels (not components).
    pub fn linear_offset(&self, index: &[i64; D]) -> usize {
        let mut offset = 0usize;
        let mut stride = 1usize;
        for d in 0..D {
            offset += (index[d] - self.index[d]) as usize * stride;
            stride *= self.size[d];
        }
        offset
    }

    /// Every index of the region, dimension 0 fastest.
    pub fn indices(&self) -> RegionIndices<D> {
        RegionIndices {
            region: *self,
            next: if self.is_empty() { None } else { Some(self.index) },
        }
    }

    /// Start index of every row along dimension 0.
    pub fn row_starts(&self) -> RegionIndices<D> {
        let mut rows = *self;
        if D > 0 && rows.size[0] > 0 {
            rows.size[0] = 1;
        }
        rows.indices()
    }
}

impl<const D: usize> fmt::Display for Region<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[index={:?}, size={:?}]", self.index, self.size)
    }
}

/// Odometer over the indices of a region.
pub struct RegionIndices<const D: usize> {
    region: Region<D>,
    next: Option<[i64; D]>,
}

impl<const D: usize> Iterator for RegionIndices<D> {
    type Item = [i64; D];

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut advanced = current;
        let mut carried = true;
        for d in 0..D {
            advanced[d] += 1;
            if advanced[d] < self.region.upper(d) {
                carried = false;
                break;
            }
            advanced[d] = self.region.index[d];
        }
        self.next = if carried { None } else { Some(advanced) };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect_overlapping() {
        let a = Region::new([0, 0], [10, 10]);
        let b = Region::new([5, 8], [10, 10]);
        let i = a.intersect(&b).unwrap();
        assert_eq!(i, Region::new([5, 8], [5, 2]));
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = Region::new([0, 0], [10, 10]);
        let b = Region::new([10, 0], [3, 3]);
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn test_indices_order() {
        let r = Region::new([1, 2], [2, 2]);
        let all: Vec<_> = r.indices().collect();
        assert_eq!(all, vec![[1, 2], [2, 2], [1, 3], [2, 3]]);
    }

    #[test]
    fn test_row_starts() {
        let r = Region::new([4, 0, 1], [3, 2, 2]);
        let rows: Vec<_> = r.row_starts().collect();
        assert_eq!(rows, vec![[4, 0, 1], [4, 1, 1], [4, 0, 2], [4, 1, 2]]);
    }

    #[test]
    fn test_linear_offset() {
        let r = Region::new([1, 1, 1], [4, 3, 2]);
        assert_eq!(r.linear_offset(&[1, 1, 1]), 0);
        assert_eq!(r.linear_offset(&[2, 1, 1]), 1);
        assert_eq!(r.linear_offset(&[1, 2, 1]), 4);
        assert_eq!(r.linear_offset(&[4, 3, 2]), 3 + 2 * 4 + 12);
    }

    #[test]
    fn test_empty_region_has_no_indices() {
        let r = Region::new([0, 0], [0, 5]);
        assert_eq!(r.indices().count(), 0);
    }

    #[test]
    fn test_ensure_contains() {
        let total = Region::new([0, 0], [10, 10]);
        let paste = Region::new([5, 5], [15, 15]);
        assert!(matches!(
            total.ensure_contains(&paste),
            Err(PipelineError::RegionOutOfBounds { .. })
        ));
        assert!(total.ensure_contains(&Region::new([2, 3], [4, 4])).is_ok());
    }
}
