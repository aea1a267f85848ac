//! Lightweight types shared by the viewer core and its front ends.
//!
//! Everything here is plain data (serde-serializable) plus the statistics
//! helpers used for background estimation.

pub mod camera;
pub mod display;
pub mod star;
pub mod stats_scan;

pub use camera::{CameraSettings, ExposureStatus, PixelFormat};
pub use display::{DisplayParameters, FocusAlgorithm, FocusOverlay, FocusSettings, StretchBucket};
pub use star::StarRecord;
pub use stats_scan::{sigma_clipped_stats, ClippedStats, StatsError, StatsScan};
