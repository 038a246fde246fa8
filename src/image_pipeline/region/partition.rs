use tracing::debug;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::region::types::Region;

/// Axis along which a region is cut into pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitAxis {
    /// Highest dimension with more than one row, so that every piece is a
    /// contiguous run of the file payload.
    #[default]
    Outermost,
    /// Dimension with the largest extent, the lowest one on ties.
    Largest,
    Fixed(usize),
}

impl SplitAxis {
    fn resolve<const D: usize>(self, region: &Region<D>) -> Result<usize> {
        match self {
            SplitAxis::Outermost => Ok((0..D).rev().find(|&d| region.size[d] > 1).unwrap_or(0)),
            SplitAxis::Largest => Ok((0..D)
                .rev()
                .max_by_key(|&d| region.size[d])
                .unwrap_or(0)),
            SplitAxis::Fixed(axis) if axis < D => Ok(axis),
            SplitAxis::Fixed(axis) => Err(PipelineError::InvalidPartition {
                pieces: 0,
                extent: 0,
                axis,
            }),
        }
    }
}

/// Splits regions into sequential pieces for streamed writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionPartitioner {
    axis: SplitAxis,
}

impl RegionPartitioner {
    pub fn new(axis: SplitAxis) -> Self {
        Self { axis }
    }

    /// Cuts `full` into `piece_count` slabs along the splitting axis, in
    /// increasing index order.
    ///
    /// Slab thicknesses differ by at most one row; the leading pieces take the
    /// remainder. The union of the pieces is exactly `full`.
    pub fn partition<const D: usize>(
        &self,
        full: &Region<D>,
        piece_count: usize,
    ) -> Result<Vec<Region<D>>> {
        if D == 0 {
            return Err(PipelineError::InvalidPartition {
                pieces: piece_count,
                extent: 0,
                axis: 0,
            });
        }

        let axis = self.axis.resolve(full)?;
        let extent = full.size[axis];
        if piece_count == 0 || piece_count > extent {
            return Err(PipelineError::InvalidPartition {
                pieces: piece_count,
                extent,
                axis,
            });
        }

        let base = extent / piece_count;
        let remainder = extent % piece_count;

        let mut pieces = Vec::with_capacity(piece_count);
        let mut start = full.index[axis];
        for i in 0..piece_count {
            let thickness = base + usize::from(i < remainder);
            let mut piece = *full;
            piece.index[axis] = start;
            piece.size[axis] = thickness;
            pieces.push(piece);
            start += thickness as i64;
        }

        debug!(
            axis,
            pieces = piece_count,
            region = %full,
            "Partitioned region"
        );
        Ok(pieces)
    }
}

/// Partition with the default [`SplitAxis::Outermost`] axis.
pub fn partition<const D: usize>(full: &Region<D>, piece_count: usize) -> Result<Vec<Region<D>>> {
    RegionPartitioner::default().partition(full, piece_count)
}
