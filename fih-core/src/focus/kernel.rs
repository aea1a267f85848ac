//! Density-enhancement kernel, convolution and peak search shared by the
//! star finders.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

/// `sigma = fwhm * FWHM_TO_SIGMA` for a Gaussian.
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

/// Footprint radius in units of sigma.
const SIGMA_RADIUS: f64 = 1.5;

/// Zero-mean circular Gaussian used to enhance point sources.
#[derive(Debug, Clone)]
pub struct StarKernel {
    pub fwhm: f64,
    pub sigma: f64,
    /// Half size of the square kernel array
    pub half: usize,
    /// Unmasked, unnormalized Gaussian
    pub gaussian: Array2<f64>,
    /// Pixels inside the circular footprint
    pub mask: Array2<bool>,
    pub npixels: usize,
    /// Normalized kernel: zero mean over the footprint, zero outside
    pub data: Array2<f64>,
    /// Relative error of the fitted amplitude; scales the detection threshold
    pub rel_err: f64,
}

impl StarKernel {
    pub fn new(fwhm: f64) -> Self {
        let sigma = fwhm * FWHM_TO_SIGMA;
        let radius = (SIGMA_RADIUS * sigma).max(2.0);
        let half = radius.floor() as usize;
        let size = 2 * half + 1;
        let offset = |i: usize| i as f64 - half as f64;

        let gaussian = Array2::from_shape_fn((size, size), |(r, c)| {
            let (dy, dx) = (offset(r), offset(c));
            (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
        });
        let mask = Array2::from_shape_fn((size, size), |(r, c)| {
            let (dy, dx) = (offset(r), offset(c));
            dx * dx + dy * dy <= radius * radius
        });
        let npixels = mask.iter().filter(|&&m| m).count();

        let masked: Vec<f64> = gaussian
            .iter()
            .zip(mask.iter())
            .filter_map(|(&g, &m)| m.then_some(g))
            .collect();
        let sum: f64 = masked.iter().sum();
        let sum_sq: f64 = masked.iter().map(|g| g * g).sum();
        let n = npixels as f64;
        let denom = sum_sq - sum * sum / n;
        let mean = sum / n;

        let data = Array2::from_shape_fn((size, size), |(r, c)| {
            if mask[[r, c]] {
                (gaussian[[r, c]] - mean) / denom
            } else {
                0.0
            }
        });

        Self {
            fwhm,
            sigma,
            half,
            gaussian,
            mask,
            npixels,
            data,
            rel_err: 1.0 / denom.sqrt(),
        }
    }

    pub fn size(&self) -> usize {
        2 * self.half + 1
    }
}

/// Correlate `img` with the kernel, treating pixels outside the frame as zero.
pub fn convolve(img: ArrayView2<f64>, kernel: &StarKernel) -> Array2<f64> {
    let (h, w) = img.dim();
    let half = kernel.half as i64;
    let taps: Vec<(i64, i64, f64)> = kernel
        .data
        .indexed_iter()
        .filter(|&((r, c), _)| kernel.mask[[r, c]])
        .map(|((r, c), &k)| (r as i64 - half, c as i64 - half, k))
        .collect();

    let mut out = vec![0.0f64; h * w];
    if w > 0 {
        out.par_chunks_mut(w).enumerate().for_each(|(y, line)| {
            for (x, value) in line.iter_mut().enumerate() {
                let mut acc = 0.0;
                for &(dy, dx, k) in &taps {
                    let (sy, sx) = (y as i64 + dy, x as i64 + dx);
                    if sy >= 0 && sx >= 0 && sy < h as i64 && sx < w as i64 {
                        acc += k * img[[sy as usize, sx as usize]];
                    }
                }
                *value = acc;
            }
        });
    }
    Array2::from_shape_vec((h, w), out).unwrap_or_else(|_| Array2::zeros((h, w)))
}

/// Local maxima of `convolved` above `threshold` whose footprint lies fully
/// inside the frame, as `(row, col)`.
///
/// Ties on a plateau resolve to the first pixel in raster order.
pub fn find_peaks(convolved: ArrayView2<f64>, kernel: &StarKernel, threshold: f64) -> Vec<(usize, usize)> {
    let (h, w) = convolved.dim();
    let half = kernel.half;
    if h < kernel.size() || w < kernel.size() {
        return Vec::new();
    }
    let neighbours: Vec<(i64, i64)> = kernel
        .mask
        .indexed_iter()
        .filter(|&((r, c), &m)| m && !(r == half && c == half))
        .map(|((r, c), _)| (r as i64 - half as i64, c as i64 - half as i64))
        .collect();

    (half..h - half)
        .into_par_iter()
        .flat_map_iter(|y| {
            let neighbours = &neighbours;
            (half..w - half).filter_map(move |x| {
                let v = convolved[[y, x]];
                if v <= threshold {
                    return None;
                }
                let is_peak = neighbours.iter().all(|&(dy, dx)| {
                    let n = convolved[[(y as i64 + dy) as usize, (x as i64 + dx) as usize]];
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if earlier {
                        v > n
                    } else {
                        v >= n
                    }
                });
                is_peak.then_some((y, x))
            })
        })
        .collect()
}

/// Square cutouts of the data and convolved planes around one peak.
#[derive(Debug, Clone)]
pub struct Cutout {
    pub row: usize,
    pub col: usize,
    pub data: Array2<f64>,
    pub convolved: Array2<f64>,
}

impl Cutout {
    pub fn extract(
        data: ArrayView2<f64>,
        convolved: ArrayView2<f64>,
        kernel: &StarKernel,
        (row, col): (usize, usize),
    ) -> Self {
        let half = kernel.half;
        let window = ndarray::s![row - half..=row + half, col - half..=col + half];
        Self {
            row,
            col,
            data: data.slice(window).to_owned(),
            convolved: convolved.slice(window).to_owned(),
        }
    }

    /// Sum of data pixels inside the footprint.
    pub fn masked_sum(&self, kernel: &StarKernel) -> f64 {
        self.data
            .iter()
            .zip(kernel.mask.iter())
            .filter_map(|(&v, &m)| m.then_some(v))
            .sum()
    }

    pub fn peak(&self, kernel: &StarKernel) -> f64 {
        self.data[[kernel.half, kernel.half]]
    }
}
