//! Fit-to-viewport resampling.
//!
//! Downscaling averages source areas, upscaling interpolates bilinearly with
//! half-pixel centres. Both are applied separably, rows first.

use ndarray::{Array3, ArrayView3};
use rayon::prelude::*;

use super::Viewport;

/// A resampled image together with the factor that produced it.
#[derive(Debug, Clone)]
pub struct Scaled {
    pub image: Array3<f32>,
    /// Source pixels per output pixel
    pub factor: f64,
}

/// `max(w / vw, h / vh)`: the factor that fits the whole frame in the viewport.
pub fn fit_factor(width: usize, height: usize, viewport: Viewport) -> f64 {
    let vw = viewport.width.max(1) as f64;
    let vh = viewport.height.max(1) as f64;
    (width as f64 / vw).max(height as f64 / vh)
}

/// Output size `floor(dim / factor)`, never below one pixel.
pub fn target_dims(width: usize, height: usize, factor: f64) -> (usize, usize) {
    // Absorb rounding in dim / (dim / viewport)
    let fit = |dim: usize| ((dim as f64 / factor + 1e-9).floor() as usize).max(1);
    let (w, h) = (fit(width), fit(height));
    (w, h)
}

/// Scale `img` (`[row, col, channel]`) to fit the viewport.
pub fn scale_to_fit(img: ArrayView3<f32>, viewport: Viewport) -> Scaled {
    let (height, width, _) = img.dim();
    if width == 0 || height == 0 {
        return Scaled {
            image: img.to_owned(),
            factor: 1.0,
        };
    }
    let factor = fit_factor(width, height, viewport);
    let (new_w, new_h) = target_dims(width, height, factor);
    Scaled {
        image: resize(img, new_w, new_h),
        factor,
    }
}

/// Resample to `new_w` x `new_h`.
pub fn resize(img: ArrayView3<f32>, new_w: usize, new_h: usize) -> Array3<f32> {
    let (height, width, channels) = img.dim();
    if new_w == width && new_h == height {
        return img.to_owned();
    }
    let downscale = new_w < width || new_h < height;
    let x_taps = axis_taps(width, new_w, downscale);
    let y_taps = axis_taps(height, new_h, downscale);

    // Horizontal pass: height x new_w
    let mut rows = vec![0.0f32; height * new_w * channels];
    rows.par_chunks_mut(new_w * channels)
        .enumerate()
        .for_each(|(r, line)| {
            for (x, taps) in x_taps.iter().enumerate() {
                for ch in 0..channels {
                    line[x * channels + ch] = taps.iter().map(|&(j, w)| img[[r, j, ch]] * w).sum();
                }
            }
        });

    // Vertical pass: new_h x new_w
    let stride = new_w * channels;
    let mut out = vec![0.0f32; new_h * stride];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, line)| {
        for (i, value) in line.iter_mut().enumerate() {
            *value = y_taps[y].iter().map(|&(j, w)| rows[j * stride + i] * w).sum();
        }
    });

    Array3::from_shape_vec((new_h, new_w, channels), out)
        .unwrap_or_else(|_| Array3::zeros((new_h, new_w, channels)))
}

/// Source indices and weights contributing to each output sample on one axis.
fn axis_taps(in_len: usize, out_len: usize, area: bool) -> Vec<Vec<(usize, f32)>> {
    let ratio = in_len as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            if area && ratio > 1.0 {
                let start = i as f64 * ratio;
                let end = ((i + 1) as f64 * ratio).min(in_len as f64);
                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(in_len);
                (first..last)
                    .filter_map(|j| {
                        let overlap = (end.min((j + 1) as f64) - start.max(j as f64)).max(0.0);
                        (overlap > 0.0).then_some((j, (overlap / (end - start)) as f32))
                    })
                    .collect()
            } else {
                let src = ((i as f64 + 0.5) * ratio - 0.5).clamp(0.0, (in_len - 1) as f64);
                let j0 = src.floor() as usize;
                let j1 = (j0 + 1).min(in_len - 1);
                let frac = (src - j0 as f64) as f32;
                if j1 == j0 || frac == 0.0 {
                    vec![(j0, 1.0)]
                } else {
                    vec![(j0, 1.0 - frac), (j1, frac)]
                }
            }
        })
        .collect()
}
