//! Region module
//!
//! Index-space boxes and the partitioner that cuts them into streaming pieces.

mod partition;
pub mod types;


pub use partition::{RegionPartitioner, SplitAxis, partition};
pub use types::{Region, RegionIndices};
