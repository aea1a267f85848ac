//! Camera abstraction used by the capture loop.

use fih_shared::{CameraSettings, ExposureStatus};

use crate::error::CameraResult;

/// One exposure as delivered by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// Monotonic exposure counter assigned by the camera
    pub sequence: u64,
    pub width: usize,
    pub height: usize,
    /// Driver image-type code, see [`fih_shared::PixelFormat::from_code`]
    pub format_code: i32,
    /// Bayer tag for colour sensors
    pub bayer: Option<String>,
    pub pixels: Vec<u8>,
}

/// A device that can run free exposures.
///
/// Methods take `&mut self`; the capture loop is the only caller.
pub trait Camera: Send {
    fn name(&self) -> &str;

    /// Bayer tag of a colour sensor, `None` for monochrome models.
    fn bayer_pattern(&self) -> Option<String>;

    /// Push `settings` to the device.
    ///
    /// A refused value is reported as [`crate::error::CameraError::Protocol`];
    /// the device may have applied some of the other controls.
    fn apply_settings(&mut self, settings: &CameraSettings) -> CameraResult<()>;

    /// Current control values as reported by the device.
    fn read_settings(&mut self) -> CameraResult<CameraSettings>;

    fn start_exposure(&mut self) -> CameraResult<()>;

    fn stop_exposure(&mut self) -> CameraResult<()>;

    fn exposure_status(&mut self) -> CameraResult<ExposureStatus>;

    /// Pixel data of the exposure that just succeeded.
    fn fetch_frame(&mut self) -> CameraResult<CapturedFrame>;
}

/// Bayer tag for a camera model.
///
/// The ASI120MC delivers its mosaic with swapped channels; other colour
/// models use GRBG.
pub fn bayer_for_model(model: &str, is_color: bool) -> Option<String> {
    if !is_color {
        None
    } else if model.contains("ASI120MC") {
        Some("RGGBi".to_string())
    } else {
        Some("GRBG".to_string())
    }
}
