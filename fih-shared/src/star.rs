//! Star detection results.

use serde::{Deserialize, Serialize};

/// A detected star with its focus metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StarRecord {
    /// X centroid (sub-pixel, column)
    pub x: f64,
    /// Y centroid (sub-pixel, row)
    pub y: f64,
    /// Background-subtracted flux inside the finder footprint
    pub flux: f64,
    /// Brightest background-subtracted pixel
    pub peak: f64,
    pub sharpness: f64,
    /// Quadrant-symmetry roundness (DAO only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roundness1: Option<f64>,
    /// Marginal-fit roundness (DAO only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roundness2: Option<f64>,
    /// Half-flux radius in pixels, once computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hfr: Option<f64>,
}
