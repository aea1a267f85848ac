//! DAOFIND-style star finder.
//!
//! Peaks of the density-enhanced image are characterised by:
//! * sharpness: central pixel excess over its footprint neighbours, relative
//!   to the fitted amplitude
//! * roundness1: quadrant asymmetry of the convolved cutout
//! * roundness2: relative difference of the amplitudes of Gaussian fits to
//!   the x and y marginal profiles
//!
//! The marginal fits also give the sub-pixel centroid.

use fih_shared::StarRecord;
use ndarray::{Array1, ArrayView2};

use super::kernel::{convolve, find_peaks, Cutout, StarKernel};

const SHARP_RANGE: (f64, f64) = (0.2, 1.0);
const ROUND_RANGE: (f64, f64) = (-1.0, 1.0);

/// Detect stars in a background-subtracted plane.
///
/// `threshold` is in data units; it is scaled by the kernel's relative error
/// before being compared with the convolved plane.
pub fn find_stars(data: ArrayView2<f64>, fwhm: f64, threshold: f64) -> Vec<StarRecord> {
    let kernel = StarKernel::new(fwhm);
    let convolved = convolve(data, &kernel);
    let peaks = find_peaks(convolved.view(), &kernel, threshold * kernel.rel_err);

    peaks
        .into_iter()
        .filter_map(|peak| {
            let cutout = Cutout::extract(data, convolved.view(), &kernel, peak);
            measure(&cutout, &kernel)
        })
        .collect()
}

fn measure(cutout: &Cutout, kernel: &StarKernel) -> Option<StarRecord> {
    let half = kernel.half;
    let conv_peak = cutout.convolved[[half, half]];
    if conv_peak <= 0.0 {
        return None;
    }

    let data_peak = cutout.peak(kernel);
    let neighbour_mean = (cutout.masked_sum(kernel) - data_peak) / (kernel.npixels - 1) as f64;
    let sharpness = (data_peak - neighbour_mean) / conv_peak;
    if !(SHARP_RANGE.0..=SHARP_RANGE.1).contains(&sharpness) {
        return None;
    }

    let roundness1 = symmetry_roundness(cutout, kernel);
    let (dx, hx) = marginal_fit(cutout.data.view(), kernel, Axis::X)?;
    let (dy, hy) = marginal_fit(cutout.data.view(), kernel, Axis::Y)?;
    let roundness2 = 2.0 * (hx - hy) / (hx + hy);
    for r in [roundness1, roundness2] {
        if !(ROUND_RANGE.0..=ROUND_RANGE.1).contains(&r) {
            return None;
        }
    }

    Some(StarRecord {
        x: cutout.col as f64 + dx,
        y: cutout.row as f64 + dy,
        flux: cutout.masked_sum(kernel),
        peak: data_peak,
        sharpness,
        roundness1: Some(roundness1),
        roundness2: Some(roundness2),
        hfr: None,
    })
}

/// Quadrant-symmetry roundness of the convolved cutout.
///
/// Zero for a four-fold symmetric source; sign tells whether the source is
/// stretched along the rows or the columns.
fn symmetry_roundness(cutout: &Cutout, kernel: &StarKernel) -> f64 {
    let c = kernel.half;
    let mut sum2 = 0.0;
    let mut sum4 = 0.0;
    for ((r, col), &v) in cutout.convolved.indexed_iter() {
        if !kernel.mask[[r, col]] || (r == c && col == c) {
            continue;
        }
        sum4 += v.abs();
        // Quadrants assigned so each off-centre pixel lands in exactly one
        let sign = if r <= c && col > c {
            -1.0
        } else if r < c && col <= c {
            1.0
        } else if r >= c && col < c {
            -1.0
        } else {
            1.0
        };
        sum2 += sign * v;
    }
    if sum4 == 0.0 {
        0.0
    } else {
        2.0 * sum2 / sum4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Fit `sky + h * gaussian` to the weighted marginal profile along `axis`.
///
/// Returns the sub-pixel shift of the source from the cutout centre and the
/// fitted amplitude, or `None` when the amplitude is not positive.
fn marginal_fit(data: ArrayView2<f64>, kernel: &StarKernel, axis: Axis) -> Option<(f64, f64)> {
    let size = kernel.size();
    let half = kernel.half as f64;
    // Triangular weights: 1 at the edges, half + 1 in the middle
    let weights = Array1::from_shape_fn(size, |i| half - (i as f64 - half).abs() + 1.0);

    let marginal = |plane: ArrayView2<f64>| -> Array1<f64> {
        Array1::from_shape_fn(size, |i| {
            (0..size)
                .map(|j| {
                    let v = match axis {
                        Axis::X => plane[[j, i]],
                        Axis::Y => plane[[i, j]],
                    };
                    weights[j] * v
                })
                .sum()
        })
    };
    let d = marginal(data);
    let k = marginal(kernel.gaussian.view());

    let sw: f64 = weights.sum();
    let sk: f64 = (&weights * &k).sum();
    let sd: f64 = (&weights * &d).sum();
    let skk: f64 = (&weights * &k * &k).sum();
    let sdk: f64 = (&weights * &d * &k).sum();

    let numer = sdk - sd * sk / sw;
    let denom = skk - sk * sk / sw;
    if numer <= 0.0 || denom <= 0.0 {
        return None;
    }
    let h = numer / denom;
    let sky = (sd - h * sk) / sw;

    // One Gauss-Newton step on the shift of the Gaussian profile
    let var = kernel.sigma * kernel.sigma;
    let mut num = 0.0;
    let mut den = 0.0;
    for i in 0..size {
        let x = i as f64 - half;
        let grad = h * k[i] * x / var;
        let resid = d[i] - sky - h * k[i];
        num += weights[i] * resid * grad;
        den += weights[i] * grad * grad;
    }
    let mut shift = if den > 0.0 { num / den } else { 0.0 };

    if shift.abs() > size as f64 / 2.0 {
        let wd: f64 = (&weights * &d).sum();
        shift = if wd == 0.0 {
            0.0
        } else {
            (0..size)
                .map(|i| weights[i] * d[i] * (i as f64 - half))
                .sum::<f64>()
                / wd
        };
    }
    Some((shift, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::focus::kernel::FWHM_TO_SIGMA;
    use ndarray::Array2;

    fn gaussian_star(h: usize, w: usize, cx: f64, cy: f64, sigma_x: f64, sigma_y: f64, amp: f64) -> Array2<f64> {
        Array2::from_shape_fn((h, w), |(r, c)| {
            let dx = c as f64 - cx;
            let dy = r as f64 - cy;
            amp * (-(dx * dx) / (2.0 * sigma_x * sigma_x) - (dy * dy) / (2.0 * sigma_y * sigma_y)).exp()
        })
    }

    #[test]
    fn test_round_star_metrics() {
        let sigma = 3.0 * FWHM_TO_SIGMA;
        let img = gaussian_star(31, 31, 15.0, 15.0, sigma, sigma, 100.0);
        let stars = find_stars(img.view(), 3.0, 5.0);
        assert_eq!(stars.len(), 1);
        let star = &stars[0];
        assert_relative_eq!(star.x, 15.0, epsilon = 1e-6);
        assert_relative_eq!(star.y, 15.0, epsilon = 1e-6);
        assert_relative_eq!(star.roundness1.unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(star.roundness2.unwrap(), 0.0, epsilon = 1e-9);
        assert!(star.sharpness > 0.3 && star.sharpness < 0.7);
        assert_relative_eq!(star.peak, 100.0);
    }

    #[test]
    fn test_subpixel_centroid() {
        let sigma = 3.0 * FWHM_TO_SIGMA;
        let img = gaussian_star(31, 31, 15.3, 14.8, sigma, sigma, 100.0);
        let stars = find_stars(img.view(), 3.0, 5.0);
        assert_eq!(stars.len(), 1);
        assert_relative_eq!(stars[0].x, 15.3, epsilon = 0.1);
        assert_relative_eq!(stars[0].y, 14.8, epsilon = 0.1);
    }

    #[test]
    fn test_elongated_star_has_nonzero_roundness() {
        let sigma = 3.0 * FWHM_TO_SIGMA;
        let img = gaussian_star(31, 31, 15.0, 15.0, sigma * 1.4, sigma, 100.0);
        let stars = find_stars(img.view(), 3.0, 5.0);
        assert_eq!(stars.len(), 1);
        assert!(stars[0].roundness2.unwrap().abs() > 0.05);
        assert!(stars[0].roundness1.unwrap().abs() > 0.01);
    }

    #[test]
    fn test_faint_source_below_threshold() {
        let sigma = 3.0 * FWHM_TO_SIGMA;
        let img = gaussian_star(31, 31, 15.0, 15.0, sigma, sigma, 2.0);
        assert!(find_stars(img.view(), 3.0, 5.0).is_empty());
    }
}
