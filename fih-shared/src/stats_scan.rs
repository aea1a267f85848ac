//! StatsScan - single-pass statistics over floating point pixel data
//!
//! Computes min, max, mean and (with a second pass) the standard deviation of
//! a slice of samples, plus the iterative sigma-clipped statistics used to
//! estimate a frame's sky background.
//!
//! [`StatsScan`] reports NaN samples as errors instead of silently poisoning
//! the sums; [`sigma_clipped_stats`] leaves non-finite samples out.

use num_traits::float::Float;
use std::fmt;
use thiserror::Error;

/// Error types for StatsScan operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("NaN value encountered at index {0}")]
    NaNEncountered(usize),
    #[error("No data provided (empty slice)")]
    NoData,
}

/// A scanner for statistics over floating point data
///
/// Min, max, sum and count are gathered in one pass. The standard deviation
/// needs the samples again and takes them as an argument.
#[derive(Debug, Clone)]
pub struct StatsScan<T: Float> {
    bounds: Option<(T, T)>,
    sum: T,
    count: usize,
    nan_index: Option<usize>,
}

impl<T: Float + fmt::Debug> StatsScan<T> {
    /// Scan `data`, stopping at the first NaN.
    pub fn new(data: &[T]) -> Self {
        let mut bounds: Option<(T, T)> = None;
        let mut sum = T::zero();
        let mut count = 0usize;
        let mut nan_index = None;

        for (index, &value) in data.iter().enumerate() {
            if value.is_nan() {
                nan_index = Some(index);
                break;
            }
            sum = sum + value;
            count += 1;
            bounds = Some(match bounds {
                None => (value, value),
                Some((lo, hi)) => (lo.min(value), hi.max(value)),
            });
        }

        Self {
            bounds,
            sum,
            count,
            nan_index,
        }
    }

    fn check(&self) -> Result<(), StatsError> {
        match self.nan_index {
            Some(index) => Err(StatsError::NaNEncountered(index)),
            None if self.count == 0 => Err(StatsError::NoData),
            None => Ok(()),
        }
    }

    /// Number of samples scanned.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Get both min and max values as a tuple
    ///
    /// # Returns
    /// * `Ok((T, T))` - `(min, max)` if data was provided and no NaN was found
    /// * `Err(StatsError)` - on NaN or empty input
    pub fn min_max(&self) -> Result<(T, T), StatsError> {
        self.check()?;
        self.bounds.ok_or(StatsError::NoData)
    }

    /// Arithmetic mean of the scanned samples.
    pub fn mean(&self) -> Result<T, StatsError> {
        self.check()?;
        let count = T::from(self.count).ok_or(StatsError::NoData)?;
        Ok(self.sum / count)
    }

    /// Population standard deviation about the scanned mean.
    ///
    /// `data` must be the same slice the scan was built from.
    pub fn std_dev(&self, data: &[T]) -> Result<T, StatsError> {
        let mean = self.mean()?;
        let count = T::from(self.count).ok_or(StatsError::NoData)?;
        let sum_sq = data
            .iter()
            .fold(T::zero(), |acc, &v| acc + (v - mean) * (v - mean));
        Ok((sum_sq / count).sqrt())
    }
}

/// Median of `data`, reordering it in place.
///
/// Even-length input averages the two middle samples.
pub fn median_in_place<T: Float>(data: &mut [T]) -> Result<T, StatsError> {
    if data.is_empty() {
        return Err(StatsError::NoData);
    }
    if let Some(index) = data.iter().position(|v| v.is_nan()) {
        return Err(StatsError::NaNEncountered(index));
    }
    let cmp = |a: &T, b: &T| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
    let len = data.len();
    let mid = len / 2;
    let (lower, upper, _) = data.select_nth_unstable_by(mid, cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return Ok(upper);
    }
    let below = lower
        .iter()
        .copied()
        .fold(T::neg_infinity(), |acc, v| acc.max(v));
    let two = T::one() + T::one();
    Ok((below + upper) / two)
}

/// Result of [`sigma_clipped_stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    /// Samples that survived clipping.
    pub retained: usize,
}

/// Iterative sigma clipping about the median.
///
/// NaN and infinite samples are masked before the first round. Each round
/// rejects samples further than `sigma` standard deviations from the current
/// median and recomputes. Stops after `max_iters` rounds or as soon as a
/// round rejects nothing.
pub fn sigma_clipped_stats<T: Float + fmt::Debug>(
    data: &[T],
    sigma: f64,
    max_iters: usize,
) -> Result<ClippedStats, StatsError> {
    let mut kept: Vec<f64> = data
        .iter()
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .collect();
    if kept.len() < data.len() {
        log::trace!("masked {} non-finite samples", data.len() - kept.len());
    }

    let mut scratch = kept.clone();
    let mut median = median_in_place(&mut scratch)?;
    let mut scan = StatsScan::new(&kept);
    let mut std = scan.std_dev(&kept)?;

    for round in 0..max_iters {
        let lo = median - sigma * std;
        let hi = median + sigma * std;
        let before = kept.len();
        kept.retain(|&v| v >= lo && v <= hi);
        if kept.len() == before || kept.is_empty() {
            log::trace!("sigma clip converged after {round} rounds");
            break;
        }
        scratch.clear();
        scratch.extend_from_slice(&kept);
        median = median_in_place(&mut scratch)?;
        scan = StatsScan::new(&kept);
        std = scan.std_dev(&kept)?;
    }

    Ok(ClippedStats {
        mean: scan.mean()?,
        median,
        std,
        retained: kept.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basic_scan() {
        let data = [1.0f64, 2.0, 3.0, 4.0];
        let scan = StatsScan::new(&data);
        assert_eq!(scan.min_max().unwrap(), (1.0, 4.0));
        assert_relative_eq!(scan.mean().unwrap(), 2.5);
        assert_relative_eq!(scan.std_dev(&data).unwrap(), 1.25f64.sqrt());
    }

    #[test]
    fn test_nan_and_empty() {
        let data = [1.0f32, f32::NAN, 3.0];
        assert_eq!(
            StatsScan::new(&data).mean(),
            Err(StatsError::NaNEncountered(1))
        );
        let empty: [f32; 0] = [];
        assert_eq!(StatsScan::new(&empty).min_max(), Err(StatsError::NoData));
    }

    #[test]
    fn test_median_odd_even() {
        let mut odd = [5.0f64, 1.0, 3.0];
        assert_relative_eq!(median_in_place(&mut odd).unwrap(), 3.0);
        let mut even = [4.0f64, 1.0, 3.0, 2.0];
        assert_relative_eq!(median_in_place(&mut even).unwrap(), 2.5);
    }

    #[test]
    fn test_sigma_clip_rejects_outliers() {
        let mut data = vec![10.0f32; 200];
        for (i, v) in data.iter_mut().enumerate() {
            *v += (i % 5) as f32 - 2.0;
        }
        data[7] = 5000.0;
        data[99] = 8000.0;

        let stats = sigma_clipped_stats(&data, 3.0, 5).unwrap();
        assert_relative_eq!(stats.median, 10.0);
        assert_relative_eq!(stats.mean, 10.0, epsilon = 0.05);
        assert!(stats.std < 2.0);
        assert_eq!(stats.retained, 198);
    }

    #[test]
    fn test_sigma_clip_masks_non_finite() {
        let mut data = vec![20.0f32; 100];
        data[0] = f32::NAN;
        data[50] = f32::INFINITY;
        data[99] = 900.0;
        let stats = sigma_clipped_stats(&data, 3.0, 5).unwrap();
        assert_relative_eq!(stats.median, 20.0);
        assert_relative_eq!(stats.mean, 20.0);
        assert_eq!(stats.retained, 97);

        let blank = [f32::NAN; 4];
        assert_eq!(sigma_clipped_stats(&blank, 3.0, 5), Err(StatsError::NoData));
    }

    #[test]
    fn test_sigma_clip_flat_data() {
        let data = vec![42.0f64; 64];
        let stats = sigma_clipped_stats(&data, 3.0, 5).unwrap();
        assert_relative_eq!(stats.median, 42.0);
        assert_relative_eq!(stats.std, 0.0);
        assert_eq!(stats.retained, 64);
    }
}
