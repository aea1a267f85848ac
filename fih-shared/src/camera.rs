//! Camera control types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample layout delivered by the camera.
///
/// The numeric codes match the driver's image-type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit raw sensor data (possibly Bayer mosaiced)
    #[default]
    Mono8,
    /// 8-bit three-channel colour
    Rgb24,
    /// 16-bit little-endian raw sensor data
    Mono16,
    /// 8-bit luminance, never mosaiced
    MonoY8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Mono8,
        PixelFormat::Rgb24,
        PixelFormat::Mono16,
        PixelFormat::MonoY8,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PixelFormat::Mono8),
            1 => Some(PixelFormat::Rgb24),
            2 => Some(PixelFormat::Mono16),
            3 => Some(PixelFormat::MonoY8),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            PixelFormat::Mono8 => 0,
            PixelFormat::Rgb24 => 1,
            PixelFormat::Mono16 => 2,
            PixelFormat::MonoY8 => 3,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::MonoY8 => 1,
            PixelFormat::Mono16 => 2,
            PixelFormat::Rgb24 => 3,
        }
    }

    /// Largest sample value, used as the default white level.
    pub fn white_level(self) -> f32 {
        match self {
            PixelFormat::Mono16 => 65535.0,
            _ => 255.0,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Mono8 => "RAW8",
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Mono16 => "RAW16",
            PixelFormat::MonoY8 => "Y8",
        };
        f.write_str(name)
    }
}

/// Progress of the exposure currently running on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureStatus {
    Idle,
    Working,
    Succeeded,
    Failed,
}

/// Controls pushed to the camera before an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub format: PixelFormat,
    pub exposure_us: u64,
    pub gain: i32,
    pub brightness: i32,
    pub cooler: bool,
    /// Cooler set point in degrees Celsius
    pub target_temp: i32,
    pub bin: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            format: PixelFormat::Mono8,
            exposure_us: 100_000,
            gain: 50,
            brightness: 50,
            cooler: false,
            target_temp: 0,
            bin: 1,
        }
    }
}
