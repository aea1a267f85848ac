//! Display and focus-overlay parameters.
//!
//! A `DisplayParameters` value is the full snapshot a render worker needs.
//! It is `Copy` so each worker gets its own immutable copy at dispatch time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Percentile stretch bucket.
///
/// The number is the share of pixels (in percent) clipped by the window:
/// `Bucket1` keeps the 0.05 to 99.95 percentile range, `Bucket100` the 5 to 95
/// range. `Off` uses the frame's calibration black/white levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum StretchBucket {
    #[default]
    Off,
    Bucket1,
    Bucket10,
    Bucket50,
    Bucket100,
}

impl StretchBucket {
    /// Slot in the per-frame percentile table, `None` for `Off`.
    pub fn table_index(self) -> Option<usize> {
        match self {
            StretchBucket::Off => None,
            StretchBucket::Bucket1 => Some(0),
            StretchBucket::Bucket10 => Some(1),
            StretchBucket::Bucket50 => Some(2),
            StretchBucket::Bucket100 => Some(3),
        }
    }
}

impl TryFrom<u32> for StretchBucket {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StretchBucket::Off),
            1 => Ok(StretchBucket::Bucket1),
            10 => Ok(StretchBucket::Bucket10),
            50 => Ok(StretchBucket::Bucket50),
            100 => Ok(StretchBucket::Bucket100),
            other => Err(format!(
                "unsupported stretch bucket {other} (expected 0, 1, 10, 50 or 100)"
            )),
        }
    }
}

impl From<StretchBucket> for u32 {
    fn from(bucket: StretchBucket) -> Self {
        match bucket {
            StretchBucket::Off => 0,
            StretchBucket::Bucket1 => 1,
            StretchBucket::Bucket10 => 10,
            StretchBucket::Bucket50 => 50,
            StretchBucket::Bucket100 => 100,
        }
    }
}

impl FromStr for StretchBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid stretch bucket '{s}'"))?;
        StretchBucket::try_from(value)
    }
}

/// Star finder used by the focus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusAlgorithm {
    #[default]
    Dao,
    Iraf,
}

/// Metric drawn by the focus overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusOverlay {
    #[default]
    None,
    Sharpness,
    Roundness1,
    Roundness2,
    Hfr,
}

impl FocusOverlay {
    pub fn is_active(self) -> bool {
        self != FocusOverlay::None
    }
}

macro_rules! lowercase_parse {
    ($ty:ty, $($name:literal => $variant:path),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(format!("unknown {} '{}'", stringify!($ty), s)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

lowercase_parse!(FocusAlgorithm, "dao" => FocusAlgorithm::Dao, "iraf" => FocusAlgorithm::Iraf);
lowercase_parse!(
    FocusOverlay,
    "none" => FocusOverlay::None,
    "sharpness" => FocusOverlay::Sharpness,
    "roundness1" => FocusOverlay::Roundness1,
    "roundness2" => FocusOverlay::Roundness2,
    "hfr" => FocusOverlay::Hfr,
);

/// Star-finder settings, the `focus_*` subset of [`DisplayParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusSettings {
    pub algorithm: FocusAlgorithm,
    /// Keep at most this many of the brightest detections
    pub max_stars: usize,
    /// Expected star FWHM in pixels
    pub fwhm: f64,
    /// Detection threshold in background standard deviations
    pub threshold_sigma: f64,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            algorithm: FocusAlgorithm::Dao,
            max_stars: 100,
            fwhm: 3.0,
            threshold_sigma: 3.0,
        }
    }
}

/// Everything that affects how a frame is turned into a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayParameters {
    /// Fit the frame into the viewport
    pub scale: bool,
    pub invert: bool,
    pub histogram_stretch: StretchBucket,
    /// Power applied after windowing; 0 disables it
    pub gamma: f64,
    /// Render colour frames through their luminance plane
    pub force_gray: bool,
    /// Stretch the luma plane only and keep chroma ratios
    pub perceptual_mode: bool,
    pub focus_algorithm: FocusAlgorithm,
    pub focus_max_stars: usize,
    pub focus_fwhm: f64,
    pub focus_threshold_sigma: f64,
    pub focus_overlay: FocusOverlay,
    /// Draw the metric value next to each marker
    pub focus_show_values: bool,
}

impl Default for DisplayParameters {
    fn default() -> Self {
        let focus = FocusSettings::default();
        Self {
            scale: true,
            invert: false,
            histogram_stretch: StretchBucket::Off,
            gamma: 0.0,
            force_gray: false,
            perceptual_mode: false,
            focus_algorithm: focus.algorithm,
            focus_max_stars: focus.max_stars,
            focus_fwhm: focus.fwhm,
            focus_threshold_sigma: focus.threshold_sigma,
            focus_overlay: FocusOverlay::None,
            focus_show_values: false,
        }
    }
}

impl DisplayParameters {
    pub fn focus(&self) -> FocusSettings {
        FocusSettings {
            algorithm: self.focus_algorithm,
            max_stars: self.focus_max_stars,
            fwhm: self.focus_fwhm,
            threshold_sigma: self.focus_threshold_sigma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_serializes_as_integer() {
        let json = serde_json::to_string(&StretchBucket::Bucket50).unwrap();
        assert_eq!(json, "50");
        let back: StretchBucket = serde_json::from_str("10").unwrap();
        assert_eq!(back, StretchBucket::Bucket10);
        assert!(serde_json::from_str::<StretchBucket>("7").is_err());
    }

    #[test]
    fn test_parameters_json_defaults_missing_fields() {
        let params: DisplayParameters =
            serde_json::from_str(r#"{"invert": true, "focus_overlay": "hfr"}"#).unwrap();
        assert!(params.invert);
        assert!(params.scale);
        assert_eq!(params.focus_overlay, FocusOverlay::Hfr);
        assert_eq!(params.focus_max_stars, 100);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("IRAF".parse::<FocusAlgorithm>().unwrap(), FocusAlgorithm::Iraf);
        assert_eq!(
            "roundness2".parse::<FocusOverlay>().unwrap(),
            FocusOverlay::Roundness2
        );
        assert_eq!(FocusOverlay::Hfr.to_string(), "hfr");
        assert!("median".parse::<FocusOverlay>().is_err());
        assert_eq!("100".parse::<StretchBucket>().unwrap(), StretchBucket::Bucket100);
    }
}
