//! Scripted camera for tests and demos.

use std::collections::VecDeque;

use fih_shared::{CameraSettings, ExposureStatus, PixelFormat};

use super::camera::{Camera, CapturedFrame};
use crate::error::{CameraError, CameraResult};

/// A camera whose exposure statuses follow a script.
///
/// Once the script runs out every poll reports `Working`. Frames are flat
/// fields of `fill` in the current pixel format.
#[derive(Debug, Clone)]
pub struct MockCamera {
    name: String,
    width: usize,
    height: usize,
    bayer: Option<String>,
    fill: u16,
    script: VecDeque<ExposureStatus>,
    device: CameraSettings,
    max_gain: Option<i32>,
    exposing: bool,
    /// Number of `start_exposure` calls
    pub exposures_started: usize,
    /// Number of `fetch_frame` calls
    pub frames_fetched: usize,
    /// Settings accepted by the device, in order
    pub applied: Vec<CameraSettings>,
    /// Number of `read_settings` calls
    pub reads: usize,
}

impl MockCamera {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            name: "Mock Camera".to_string(),
            width,
            height,
            bayer: None,
            fill: 1000,
            script: VecDeque::new(),
            device: CameraSettings::default(),
            max_gain: None,
            exposing: false,
            exposures_started: 0,
            frames_fetched: 0,
            applied: Vec::new(),
            reads: 0,
        }
    }

    pub fn with_script(mut self, statuses: impl IntoIterator<Item = ExposureStatus>) -> Self {
        self.script.extend(statuses);
        self
    }

    pub fn with_bayer(mut self, tag: impl Into<String>) -> Self {
        self.bayer = Some(tag.into());
        self
    }

    pub fn with_fill(mut self, value: u16) -> Self {
        self.fill = value;
        self
    }

    /// Reject any gain above `limit` with a protocol error.
    pub fn with_max_gain(mut self, limit: i32) -> Self {
        self.max_gain = Some(limit);
        self
    }

    pub fn push_status(&mut self, status: ExposureStatus) {
        self.script.push_back(status);
    }

    pub fn is_exposing(&self) -> bool {
        self.exposing
    }

    fn frame_bytes(&self, format: PixelFormat) -> Vec<u8> {
        let n = self.width * self.height;
        match format {
            PixelFormat::Mono16 => self
                .fill
                .to_le_bytes()
                .iter()
                .copied()
                .cycle()
                .take(2 * n)
                .collect(),
            other => vec![self.fill.min(255) as u8; n * other.bytes_per_pixel()],
        }
    }
}

impl Camera for MockCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn bayer_pattern(&self) -> Option<String> {
        self.bayer.clone()
    }

    fn apply_settings(&mut self, settings: &CameraSettings) -> CameraResult<()> {
        if let Some(limit) = self.max_gain {
            if settings.gain > limit {
                return Err(CameraError::Protocol(format!(
                    "gain {} outside 0..={limit}",
                    settings.gain
                )));
            }
        }
        self.device = *settings;
        self.applied.push(*settings);
        Ok(())
    }

    fn read_settings(&mut self) -> CameraResult<CameraSettings> {
        self.reads += 1;
        Ok(self.device)
    }

    fn start_exposure(&mut self) -> CameraResult<()> {
        self.exposing = true;
        self.exposures_started += 1;
        Ok(())
    }

    fn stop_exposure(&mut self) -> CameraResult<()> {
        self.exposing = false;
        Ok(())
    }

    fn exposure_status(&mut self) -> CameraResult<ExposureStatus> {
        if !self.exposing {
            return Ok(ExposureStatus::Idle);
        }
        let status = self.script.pop_front().unwrap_or(ExposureStatus::Working);
        if matches!(status, ExposureStatus::Succeeded | ExposureStatus::Failed | ExposureStatus::Idle) {
            self.exposing = false;
        }
        Ok(status)
    }

    fn fetch_frame(&mut self) -> CameraResult<CapturedFrame> {
        self.frames_fetched += 1;
        let format = self.device.format;
        Ok(CapturedFrame {
            sequence: self.frames_fetched as u64,
            width: self.width,
            height: self.height,
            format_code: format.code(),
            bayer: self.bayer_pattern(),
            pixels: self.frame_bytes(format),
        })
    }
}
