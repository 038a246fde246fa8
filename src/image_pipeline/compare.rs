//! Image comparison module
//!
//! Pixel-wise comparison with an intensity tolerance and a spatial tolerance radius.

mod comparator;


pub use comparator::{ComparisonResult, ToleranceComparator, compare};
