//! Histogram-percentile and gamma stretching.

use fih_shared::StretchBucket;
use ndarray::{Array2, ArrayView2, ArrayViewMut3, Axis};
use rayon::prelude::*;

/// Percentiles sampled once per frame, low bounds first.
pub const PERCENTILES: [f64; 8] = [0.05, 0.5, 2.5, 5.0, 95.0, 97.5, 99.5, 99.95];

/// Indices into [`PERCENTILES`] of the (low, high) bound of each bucket.
const BUCKET_BOUNDS: [(usize, usize); 4] = [(0, 7), (1, 6), (2, 5), (3, 4)];

/// Percentiles of `data` using linear interpolation between order statistics.
///
/// Returns `None` for empty input.
pub fn percentiles(data: ArrayView2<f32>, pcts: &[f64]) -> Option<Vec<f32>> {
    let mut sorted: Vec<f32> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.par_sort_unstable_by(f32::total_cmp);
    let last = (sorted.len() - 1) as f64;
    Some(
        pcts.iter()
            .map(|&p| {
                let pos = (p / 100.0 * last).clamp(0.0, last);
                let lo = pos.floor() as usize;
                let hi = pos.ceil() as usize;
                let frac = (pos - lo as f64) as f32;
                sorted[lo] + (sorted[hi] - sorted[lo]) * frac
            })
            .collect(),
    )
}

/// Per-frame table of stretch windows, one slot per non-off bucket.
///
/// The percentiles are computed on first use and every bucket's window is
/// filled from that single pass.
#[derive(Debug, Clone, Default)]
pub struct PercentileCache {
    table: Option<[(f32, f32); 4]>,
    passes: usize,
}

impl PercentileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_filled(&self) -> bool {
        self.table.is_some()
    }

    /// Percentile passes made over the data so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Window for `bucket`, or `None` for [`StretchBucket::Off`] or an empty plane.
    pub fn window(&mut self, gray: ArrayView2<f32>, bucket: StretchBucket) -> Option<(f32, f32)> {
        let slot = bucket.table_index()?;
        if self.table.is_none() {
            self.passes += 1;
            let p = percentiles(gray, &PERCENTILES)?;
            self.table = Some(BUCKET_BOUNDS.map(|(lo, hi)| (p[lo], p[hi])));
        }
        self.table.map(|t| t[slot])
    }
}

/// Raise every sample to `gamma`; a gamma of zero leaves the data alone.
///
/// Negative samples are clamped to zero first.
pub fn gamma_stretch(img: &mut Array2<f32>, gamma: f64) {
    if gamma == 0.0 {
        return;
    }
    let g = gamma as f32;
    img.par_mapv_inplace(|v| v.max(0.0).powf(g));
}

/// Linear display window, optionally gamma-warped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchWindow {
    pub low: f32,
    pub high: f32,
    pub gamma: f32,
}

impl StretchWindow {
    /// The bounds are raised to the same power as the samples.
    pub fn new(low: f32, high: f32, gamma: f64) -> Self {
        let gamma = gamma as f32;
        let (low, high) = if gamma != 0.0 {
            (low.max(0.0).powf(gamma), high.max(0.0).powf(gamma))
        } else {
            (low, high)
        };
        Self { low, high, gamma }
    }

    /// Map one sample into display units `[0, 255]`, unclipped and unrounded.
    pub fn map(&self, value: f32) -> f32 {
        let v = if self.gamma != 0.0 {
            value.max(0.0).powf(self.gamma)
        } else {
            value
        };
        let span = (self.high - self.low).max(f32::EPSILON);
        (v - self.low) / (span / 255.0)
    }
}

/// Clip to `[0, 255]`, round and cast.
pub fn to_display_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0).round() as u8
}

/// Apply `window` to every channel of `img` in place (display units).
pub fn stretch_channels(mut img: ArrayViewMut3<f32>, window: StretchWindow) {
    img.par_mapv_inplace(|v| window.map(v).clamp(0.0, 255.0));
}

/// Stretch the BT.601 luma of `img` and rescale each channel by the luma gain.
///
/// Hue and saturation ratios survive; only brightness follows the window.
pub fn stretch_luma(mut img: ArrayViewMut3<f32>, red: usize, blue: usize, window: StretchWindow) {
    let weights = {
        let mut w = [0.0f32; 3];
        w[red] = super::gray::LUMA_WEIGHTS[0];
        w[1] = super::gray::LUMA_WEIGHTS[1];
        w[blue] = super::gray::LUMA_WEIGHTS[2];
        w
    };
    img.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            for mut px in row.axis_iter_mut(Axis(0)) {
                let luma: f32 = (0..3).map(|c| px[c] * weights[c]).sum();
                let stretched = window.map(luma).clamp(0.0, 255.0);
                if luma > 0.0 {
                    let gain = stretched / luma;
                    px.mapv_inplace(|v| (v * gain).clamp(0.0, 255.0));
                } else {
                    px.fill(stretched);
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn ramp(n: usize) -> Array2<f32> {
        Array2::from_shape_fn((1, n), |(_, c)| c as f32)
    }

    #[test]
    fn test_percentiles_linear_interpolation() {
        let data = ramp(101);
        let p = percentiles(data.view(), &[0.0, 50.0, 2.5, 100.0]).unwrap();
        assert_relative_eq!(p[0], 0.0);
        assert_relative_eq!(p[1], 50.0);
        assert_relative_eq!(p[2], 2.5);
        assert_relative_eq!(p[3], 100.0);
    }

    #[test]
    fn test_bucket_windows_use_matching_percentiles() {
        // 0..=10000 so percentile p maps to value 100 * p
        let data = ramp(10001);
        let mut cache = PercentileCache::new();
        assert_eq!(cache.window(data.view(), StretchBucket::Off), None);
        assert!(!cache.is_filled());

        let expected = [
            (StretchBucket::Bucket1, 5.0, 9995.0),
            (StretchBucket::Bucket10, 50.0, 9950.0),
            (StretchBucket::Bucket50, 250.0, 9750.0),
            (StretchBucket::Bucket100, 500.0, 9500.0),
        ];
        for (bucket, lo, hi) in expected {
            let (l, h) = cache.window(data.view(), bucket).unwrap();
            assert_relative_eq!(l, lo, epsilon = 1e-2);
            assert_relative_eq!(h, hi, epsilon = 1e-2);
        }
        assert!(cache.is_filled());
    }

    #[test]
    fn test_cache_is_not_recomputed() {
        let data = ramp(1001);
        let mut cache = PercentileCache::new();
        let first = cache.window(data.view(), StretchBucket::Bucket10).unwrap();
        // A different plane must not change cached results
        let other = Array2::<f32>::zeros((4, 4));
        let second = cache.window(other.view(), StretchBucket::Bucket10).unwrap();
        assert_eq!(first, second);
        cache.window(data.view(), StretchBucket::Bucket100).unwrap();
        assert_eq!(cache.passes(), 1);
    }

    #[test]
    fn test_gamma_zero_is_noop_and_round_trip() {
        let original = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f32 * 7.5);
        let mut img = original.clone();
        gamma_stretch(&mut img, 0.0);
        assert_eq!(img, original);

        gamma_stretch(&mut img, 1.0 / 2.2);
        gamma_stretch(&mut img, 2.2);
        for (a, b) in img.iter().zip(original.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-4, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_window_with_gamma_raises_bounds() {
        let w = StretchWindow::new(4.0, 16.0, 0.5);
        assert_relative_eq!(w.low, 2.0);
        assert_relative_eq!(w.high, 4.0);
        assert_relative_eq!(w.map(16.0), 255.0);
        assert_relative_eq!(w.map(4.0), 0.0);
    }

    #[test]
    fn test_flat_16bit_maps_to_four() {
        let w = StretchWindow::new(0.0, 65535.0, 0.0);
        assert_eq!(to_display_u8(w.map(1000.0)), 4);
        assert_eq!(to_display_u8(w.map(-50.0)), 0);
        assert_eq!(to_display_u8(w.map(70000.0)), 255);
    }

    #[test]
    fn test_degenerate_window_does_not_produce_nan() {
        let w = StretchWindow::new(10.0, 10.0, 0.0);
        assert_eq!(to_display_u8(w.map(10.0)), 0);
        assert_eq!(to_display_u8(w.map(11.0)), 255);
    }

    #[test]
    fn test_luma_stretch_preserves_hue_ratio() {
        let mut img = Array3::<f32>::zeros((1, 1, 3));
        img[[0, 0, 0]] = 40.0;
        img[[0, 0, 1]] = 20.0;
        img[[0, 0, 2]] = 10.0;
        stretch_luma(img.view_mut(), 0, 2, StretchWindow::new(0.0, 100.0, 0.0));
        assert_relative_eq!(img[[0, 0, 0]] / img[[0, 0, 1]], 2.0, epsilon = 1e-4);
        assert_relative_eq!(img[[0, 0, 1]] / img[[0, 0, 2]], 2.0, epsilon = 1e-4);
        assert!(img[[0, 0, 0]] > 40.0);
    }
}
