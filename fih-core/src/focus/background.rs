//! Sky background estimate for star detection.

use fih_shared::{sigma_clipped_stats, ClippedStats, StatsError};
use ndarray::ArrayView2;

/// Clip samples further than this many standard deviations from the median.
pub const CLIP_SIGMA: f64 = 3.0;
/// Upper bound on clipping rounds.
pub const CLIP_MAX_ITERS: usize = 5;

/// Sigma-clipped mean, median and standard deviation of a gray plane.
///
/// The median is the working background level; the standard deviation scales
/// the detection threshold.
pub fn estimate_background(gray: ArrayView2<f32>) -> Result<ClippedStats, StatsError> {
    let samples: Vec<f32> = match gray.as_slice() {
        Some(slice) => slice.to_vec(),
        None => gray.iter().copied().collect(),
    };
    sigma_clipped_stats(&samples, CLIP_SIGMA, CLIP_MAX_ITERS)
}
