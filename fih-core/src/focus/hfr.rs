//! Half-flux radius by bisection over exact circular apertures.

use ndarray::ArrayView2;

/// Bisection stops once the step falls below this many pixels.
pub const MIN_STEP: f64 = 0.01;

/// `∫₀ˣ sqrt(r² - t²) dt` with `x` clamped to `[-r, r]`.
fn chord_integral(x: f64, r: f64) -> f64 {
    let x = x.clamp(-r, r);
    0.5 * (x * (r * r - x * x).max(0.0).sqrt() + r * r * (x / r).asin())
}

/// Area of `[x0, x1] x [y0, y1]` inside the circle of radius `r` at the origin.
///
/// The x range is split wherever the circle crosses `y0` or `y1`; within each
/// piece the upper and lower bounds are either constant or follow the circle,
/// so every piece integrates in closed form.
pub fn circle_rect_overlap(x0: f64, x1: f64, y0: f64, y1: f64, r: f64) -> f64 {
    let (a, b) = (x0.max(-r), x1.min(r));
    if a >= b || y0 >= y1 || r <= 0.0 {
        return 0.0;
    }
    let mut cuts = vec![a, b];
    for y in [y0, y1] {
        if y.abs() < r {
            let xb = (r * r - y * y).sqrt();
            cuts.extend([-xb, xb].into_iter().filter(|&x| x > a && x < b));
        }
    }
    cuts.sort_by(f64::total_cmp);

    let mut area = 0.0;
    for pair in cuts.windows(2) {
        let (s, e) = (pair[0], pair[1]);
        if e <= s {
            continue;
        }
        let mid = 0.5 * (s + e);
        let h = (r * r - mid * mid).max(0.0).sqrt();
        let top_flat = y1 < h;
        let bottom_flat = y0 > -h;
        let top = if top_flat { y1 } else { h };
        let bottom = if bottom_flat { y0 } else { -h };
        if top <= bottom {
            continue;
        }
        let arc = chord_integral(e, r) - chord_integral(s, r);
        let upper = if top_flat { y1 * (e - s) } else { arc };
        let lower = if bottom_flat { y0 * (e - s) } else { -arc };
        area += upper - lower;
    }
    area
}

/// Flux inside radius `r` around `(cx, cy)`, weighting each pixel by the
/// exact area of its unit square inside the circle.
///
/// Pixel `[row, col]` covers `[col - 0.5, col + 0.5] x [row - 0.5, row + 0.5]`.
/// Negative samples contribute nothing.
pub fn aperture_flux(img: ArrayView2<f64>, cx: f64, cy: f64, r: f64) -> f64 {
    let (h, w) = img.dim();
    if h == 0 || w == 0 || r <= 0.0 {
        return 0.0;
    }
    let col_lo = (cx - r).floor().max(0.0) as usize;
    let col_hi = ((cx + r).ceil().max(0.0) as usize).min(w - 1);
    let row_lo = (cy - r).floor().max(0.0) as usize;
    let row_hi = ((cy + r).ceil().max(0.0) as usize).min(h - 1);

    let mut flux = 0.0;
    for row in row_lo..=row_hi {
        let y0 = row as f64 - 0.5 - cy;
        for col in col_lo..=col_hi {
            let v = img[[row, col]];
            if v.is_nan() || v <= 0.0 {
                continue;
            }
            let x0 = col as f64 - 0.5 - cx;
            flux += v * circle_rect_overlap(x0, x0 + 1.0, y0, y0 + 1.0, r);
        }
    }
    flux
}

/// Radius enclosing half of the flux found within `2 * fwhm`.
///
/// Starts at `fwhm` with a step of `fwhm / 2`, shrinking when the enclosed
/// flux exceeds half the total and growing otherwise, halving the step each
/// time. Returns `None` when the aperture holds no positive flux.
pub fn half_flux_radius(img: ArrayView2<f64>, cx: f64, cy: f64, fwhm: f64) -> Option<f64> {
    let total = aperture_flux(img, cx, cy, 2.0 * fwhm);
    if total <= 0.0 || fwhm <= 0.0 {
        return None;
    }
    let half = total / 2.0;
    let mut radius = fwhm;
    let mut step = fwhm / 2.0;
    while step >= MIN_STEP {
        if aperture_flux(img, cx, cy, radius) > half {
            radius -= step;
        } else {
            radius += step;
        }
        step /= 2.0;
    }
    Some(radius)
}
