//! IRAF starfind-style finder: image moments of each peak's footprint.

use fih_shared::StarRecord;
use ndarray::ArrayView2;

use super::kernel::{convolve, find_peaks, Cutout, StarKernel};

const SHARP_RANGE: (f64, f64) = (0.2, 1.0);
const ROUND_RANGE: (f64, f64) = (0.0, 0.2);

/// Minimum separation between detections, in units of the FWHM.
pub const MIN_SEPARATION_FWHM: f64 = 2.0;

/// Detect stars in a background-subtracted plane.
///
/// Candidates closer than `2 * fwhm` to a brighter accepted detection are
/// discarded.
pub fn find_stars(data: ArrayView2<f64>, fwhm: f64, threshold: f64) -> Vec<StarRecord> {
    let kernel = StarKernel::new(fwhm);
    let convolved = convolve(data, &kernel);
    let mut peaks = find_peaks(convolved.view(), &kernel, threshold * kernel.rel_err);
    peaks.sort_by(|a, b| convolved[*b].total_cmp(&convolved[*a]));

    let min_sep = MIN_SEPARATION_FWHM * fwhm;
    let mut accepted: Vec<StarRecord> = Vec::new();
    for peak in peaks {
        let cutout = Cutout::extract(data, convolved.view(), &kernel, peak);
        let Some(star) = measure(&cutout, &kernel) else {
            continue;
        };
        let crowded = accepted
            .iter()
            .any(|s| (s.x - star.x).hypot(s.y - star.y) < min_sep);
        if !crowded {
            accepted.push(star);
        }
    }
    accepted
}

fn measure(cutout: &Cutout, kernel: &StarKernel) -> Option<StarRecord> {
    let half = kernel.half as f64;
    let pixels: Vec<(f64, f64, f64)> = cutout
        .data
        .indexed_iter()
        .filter(|&((r, c), _)| kernel.mask[[r, c]])
        .map(|((r, c), &v)| (c as f64 - half, r as f64 - half, v.max(0.0)))
        .collect();

    let m0: f64 = pixels.iter().map(|p| p.2).sum();
    if m0 <= 0.0 {
        return None;
    }
    let xc = pixels.iter().map(|p| p.0 * p.2).sum::<f64>() / m0;
    let yc = pixels.iter().map(|p| p.1 * p.2).sum::<f64>() / m0;

    let (mut mu20, mut mu02, mut mu11) = (0.0, 0.0, 0.0);
    for &(x, y, v) in &pixels {
        let (dx, dy) = (x - xc, y - yc);
        mu20 += v * dx * dx;
        mu02 += v * dy * dy;
        mu11 += v * dx * dy;
    }
    mu20 /= m0;
    mu02 /= m0;
    mu11 /= m0;

    let mu_sum = mu20 + mu02;
    if mu_sum <= 0.0 {
        return None;
    }
    let measured_fwhm = 2.0 * (std::f64::consts::LN_2 * mu_sum).sqrt();
    let sharpness = measured_fwhm / kernel.fwhm;
    let roundness = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt() / mu_sum;
    if !(SHARP_RANGE.0..=SHARP_RANGE.1).contains(&sharpness)
        || !(ROUND_RANGE.0..=ROUND_RANGE.1).contains(&roundness)
    {
        return None;
    }

    Some(StarRecord {
        x: cutout.col as f64 + xc,
        y: cutout.row as f64 + yc,
        flux: m0,
        peak: cutout.peak(kernel),
        sharpness,
        roundness1: None,
        roundness2: None,
        hfr: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::kernel::FWHM_TO_SIGMA;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn add_star(img: &mut Array2<f64>, cx: f64, cy: f64, amp: f64) {
        let sigma = 3.0 * FWHM_TO_SIGMA;
        for ((r, c), v) in img.indexed_iter_mut() {
            let (dx, dy) = (c as f64 - cx, r as f64 - cy);
            *v += amp * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        }
    }

    #[test]
    fn test_single_star_moments() {
        let mut img = Array2::<f64>::zeros((32, 32));
        add_star(&mut img, 16.0, 12.0, 80.0);
        let stars = find_stars(img.view(), 3.0, 5.0);
        assert_eq!(stars.len(), 1);
        assert_relative_eq!(stars[0].x, 16.0, epsilon = 1e-9);
        assert_relative_eq!(stars[0].y, 12.0, epsilon = 1e-9);
        assert!(stars[0].sharpness > 0.5 && stars[0].sharpness < 0.9);
        assert!(stars[0].roundness1.is_none());
    }

    #[test]
    fn test_min_separation_keeps_brighter() {
        let mut img = Array2::<f64>::zeros((40, 40));
        add_star(&mut img, 15.0, 20.0, 100.0);
        // Closer than 2 * fwhm = 6 px but far enough to be its own peak
        add_star(&mut img, 20.0, 20.0, 60.0);
        add_star(&mut img, 30.0, 8.0, 50.0);
        let stars = find_stars(img.view(), 3.0, 5.0);
        assert_eq!(stars.len(), 2);
        assert!(stars.iter().any(|s| (s.x - 15.0).abs() < 0.5));
        assert!(stars.iter().all(|s| (s.x - 20.0).abs() > 1.0 || (s.y - 20.0).abs() > 1.0));
    }
}
