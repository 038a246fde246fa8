use tracing::{debug, instrument};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::{PixelBuffer, Sample};
use crate::image_pipeline::region::Region;

/// Outcome of a tolerance comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComparisonResult {
    /// Pixels with no match inside the tolerance neighbourhood
    pub differing_pixel_count: u64,
    /// Sum of the best-match difference over differing pixels
    pub total_difference: f64,
    /// Largest best-match difference over differing pixels
    pub max_difference: f64,
}

impl ComparisonResult {
    pub fn mean_difference(&self) -> f64 {
        if self.differing_pixel_count == 0 {
            0.0
        } else {
            self.total_difference / self.differing_pixel_count as f64
        }
    }
}

/// Largest per-component absolute difference between two pixels. A NaN
/// component never matches.
fn pixel_difference<T: Sample>(a: &[T], b: &[T]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x.to_f64() - y.to_f64()).abs())
        .fold(0.0, |acc, d| if d.is_nan() { f64::INFINITY } else { acc.max(d) })
}

/// Counts the pixels of `a` that have no counterpart in `b`.
///
/// With `tolerance_radius == 0` a pixel differs when its difference to the
/// same position in `b` exceeds `intensity_tolerance`. Otherwise it matches
/// when any pixel of `b` within Chebyshev distance `tolerance_radius` is
/// within tolerance. Buffers are aligned by offset from their region origin,
/// so they must have equal extents but may start at different indices.
#[instrument(skip(a, b), fields(pixels = a.region().num_pixels()))]
pub fn compare<T: Sample, const D: usize>(
    a: &PixelBuffer<T, D>,
    b: &PixelBuffer<T, D>,
    intensity_tolerance: f64,
    tolerance_radius: usize,
) -> Result<ComparisonResult> {
    let (ra, rb) = (a.region(), b.region());
    if ra.size != rb.size || a.components() != b.components() {
        return Err(PipelineError::ShapeMismatch {
            left: ra.size.to_vec(),
            right: rb.size.to_vec(),
        });
    }

    // A window wider than `b` covers no more of it.
    let span = rb.size.iter().copied().max().unwrap_or(0);
    let radius = tolerance_radius.min(span);
    let mut result = ComparisonResult::default();

    for idx in ra.indices() {
        let Some(pa) = a.pixel(&idx) else { continue };

        let mut centre = rb.index;
        for d in 0..D {
            centre[d] += idx[d] - ra.index[d];
        }

        let best = if radius == 0 {
            b.pixel(&centre).map(|pb| pixel_difference(pa, pb))
        } else {
            let mut window = Region::from_size([0; D]);
            for d in 0..D {
                window.index[d] = centre[d] - radius as i64;
                window.size[d] = 2 * radius + 1;
            }
            window.intersect(rb).and_then(|w| {
                let mut best: Option<f64> = None;
                for n in w.indices() {
                    let Some(pb) = b.pixel(&n) else { continue };
                    let diff = pixel_difference(pa, pb);
                    best = Some(best.map_or(diff, |cur: f64| cur.min(diff)));
                    if diff <= intensity_tolerance {
                        break;
                    }
                }
                best
            })
        };

        let diff = best.unwrap_or(f64::INFINITY);
        if diff > intensity_tolerance {
            result.differing_pixel_count += 1;
            result.total_difference += diff;
            result.max_difference = result.max_difference.max(diff);
        }
    }

    debug!(
        differing = result.differing_pixel_count,
        max = result.max_difference,
        "Comparison complete"
    );
    Ok(result)
}

/// Reusable comparison settings with a pass/fail allowance.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceComparator {
    pub intensity_tolerance: f64,
    pub tolerance_radius: usize,
    pub max_differing_pixels: u64,
}

impl Default for ToleranceComparator {
    fn default() -> Self {
        Self {
            intensity_tolerance: 0.0,
            tolerance_radius: 0,
            max_differing_pixels: 0,
        }
    }
}

impl ToleranceComparator {
    pub fn new(intensity_tolerance: f64, tolerance_radius: usize) -> Self {
        Self {
            intensity_tolerance,
            tolerance_radius,
            ..Self::default()
        }
    }

    pub fn with_max_differing_pixels(mut self, max: u64) -> Self {
        self.max_differing_pixels = max;
        self
    }

    pub fn compare<T: Sample, const D: usize>(
        &self,
        a: &PixelBuffer<T, D>,
        b: &PixelBuffer<T, D>,
    ) -> Result<ComparisonResult> {
        compare(a, b, self.intensity_tolerance, self.tolerance_radius)
    }

    /// True when at most `max_differing_pixels` pixels differ.
    pub fn same_image<T: Sample, const D: usize>(
        &self,
        test: &PixelBuffer<T, D>,
        baseline: &PixelBuffer<T, D>,
    ) -> Result<bool> {
        let result = self.compare(test, baseline)?;
        if result.differing_pixel_count > self.max_differing_pixels {
            debug!(
                differing = result.differing_pixel_count,
                allowed = self.max_differing_pixels,
                "Images differ"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
