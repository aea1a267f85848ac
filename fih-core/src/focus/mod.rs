//! Focus-quality engine.
//!
//! Estimates the sky background of a gray plane, finds stars with either the
//! DAO or the IRAF finder, computes half-flux radii on request and draws the
//! result over the display bitmap.

pub mod background;
pub mod dao;
pub mod hfr;
pub mod iraf;
pub mod kernel;
pub mod overlay;

use fih_shared::{ClippedStats, FocusAlgorithm, FocusOverlay, FocusSettings, StarRecord, StatsError};
use image::RgbaImage;
use ndarray::{Array2, ArrayView2};

pub use background::estimate_background;
pub use hfr::half_flux_radius;
pub use overlay::{draw_markers, Marker, OverlayError};

/// Stars found in one frame, brightest first.
#[derive(Debug, Clone)]
pub struct StarCatalog {
    stars: Vec<StarRecord>,
    algorithm: FocusAlgorithm,
    fwhm: f64,
    background: ClippedStats,
    residual: Array2<f64>,
}

impl StarCatalog {
    /// Detect stars in `gray` (full resolution).
    ///
    /// The detection threshold is `threshold_sigma` times the clipped
    /// background standard deviation. Only the `max_stars` brightest
    /// detections are kept.
    pub fn evaluate(gray: ArrayView2<f32>, settings: &FocusSettings) -> Result<Self, StatsError> {
        let background = estimate_background(gray)?;
        let sky = background.median;
        // Blank (non-finite) pixels carry no signal
        let residual = gray.mapv(|v| if v.is_finite() { v as f64 - sky } else { 0.0 });
        let threshold = settings.threshold_sigma * background.std;

        let mut stars = match settings.algorithm {
            FocusAlgorithm::Dao => dao::find_stars(residual.view(), settings.fwhm, threshold),
            FocusAlgorithm::Iraf => iraf::find_stars(residual.view(), settings.fwhm, threshold),
        };
        stars.sort_by(|a, b| b.flux.total_cmp(&a.flux));
        stars.truncate(settings.max_stars);
        log::debug!(
            "{:?} finder: {} stars above {:.1} (sky {:.1}, std {:.2})",
            settings.algorithm,
            stars.len(),
            threshold,
            sky,
            background.std
        );

        Ok(Self {
            stars,
            algorithm: settings.algorithm,
            fwhm: settings.fwhm,
            background,
            residual,
        })
    }

    pub fn stars(&self) -> &[StarRecord] {
        &self.stars
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn algorithm(&self) -> FocusAlgorithm {
        self.algorithm
    }

    pub fn background(&self) -> &ClippedStats {
        &self.background
    }

    /// Fill in the half-flux radius of every star.
    pub fn compute_hfr(&mut self) {
        for star in &mut self.stars {
            star.hfr = half_flux_radius(self.residual.view(), star.x, star.y, self.fwhm);
        }
    }

    pub fn has_hfr(&self) -> bool {
        self.stars.iter().any(|s| s.hfr.is_some())
    }

    /// The metric actually drawn for a requested one: anything this catalog
    /// cannot provide falls back to sharpness.
    pub fn effective_metric(&self, requested: FocusOverlay) -> FocusOverlay {
        let available = match requested {
            FocusOverlay::None | FocusOverlay::Sharpness => true,
            FocusOverlay::Roundness1 | FocusOverlay::Roundness2 => {
                self.algorithm == FocusAlgorithm::Dao
            }
            FocusOverlay::Hfr => self.has_hfr(),
        };
        if available {
            requested
        } else {
            FocusOverlay::Sharpness
        }
    }

    /// Mean of `|metric|` over all stars that carry it.
    pub fn threshold(&self, metric: FocusOverlay) -> Option<f64> {
        let values: Vec<f64> = self
            .stars
            .iter()
            .filter_map(|s| metric_value(s, metric))
            .map(f64::abs)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Overlay markers in bitmap coordinates (`centroid / scale_factor`).
    ///
    /// A marker is green when `|metric|` is at least the mean over all stars.
    pub fn markers(&self, requested: FocusOverlay, show_values: bool, scale_factor: f64) -> Vec<Marker> {
        let metric = self.effective_metric(requested);
        let Some(threshold) = self.threshold(metric) else {
            return Vec::new();
        };
        let factor = if scale_factor > 0.0 { scale_factor } else { 1.0 };
        self.stars
            .iter()
            .filter_map(|s| {
                let value = metric_value(s, metric)?;
                Some(Marker {
                    x: s.x / factor,
                    y: s.y / factor,
                    good: value.abs() >= threshold,
                    label: show_values.then(|| format!("{value:.2}")),
                })
            })
            .collect()
    }
}

/// Value of `metric` for one star.
pub fn metric_value(star: &StarRecord, metric: FocusOverlay) -> Option<f64> {
    match metric {
        FocusOverlay::None => None,
        FocusOverlay::Sharpness => Some(star.sharpness),
        FocusOverlay::Roundness1 => star.roundness1,
        FocusOverlay::Roundness2 => star.roundness2,
        FocusOverlay::Hfr => star.hfr,
    }
}

/// Draw the catalog's markers for `metric` onto `bitmap`.
pub fn render_overlay(
    bitmap: &mut RgbaImage,
    catalog: &StarCatalog,
    metric: FocusOverlay,
    show_values: bool,
    scale_factor: f64,
) -> Result<(), OverlayError> {
    let markers = catalog.markers(metric, show_values, scale_factor);
    draw_markers(bitmap, &markers)
}
