//! Free-running exposure loop.
//!
//! The loop is polled from the consumer's cooperative tick. Every finished
//! exposure is handed to a [`FrameSink`] unless that sink is still busy with
//! the previous frame, in which case the new frame is dropped. A new exposure
//! is started right after each success or failure.

use std::time::Duration;

use fih_shared::{CameraSettings, ExposureStatus};

use super::camera::{Camera, CapturedFrame};
use crate::error::{CameraError, CameraResult};

/// Interval between exposure-status polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consumer of live frames.
pub trait FrameSink {
    /// A previously submitted frame is still being rendered.
    fn is_rendering(&self) -> bool;

    fn submit_frame(&mut self, frame: CapturedFrame);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Exposing,
    Succeeded,
    Failed,
}

/// What one [`CaptureLoop::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Loop is not running
    Stopped,
    /// Exposure still in progress
    Waiting,
    /// Frame handed to the sink, next exposure started
    Delivered,
    /// Frame discarded because the sink was busy, next exposure started
    Dropped,
    /// Exposure failed, next exposure started
    Failed,
    /// Camera went idle unexpectedly; loop stopped
    Halted,
}

/// Counters over the life of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Exposures started, including the initial one
    pub exposures: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub failures: usize,
}

pub struct CaptureLoop<C: Camera> {
    camera: C,
    state: CaptureState,
    settings: CameraSettings,
    pending: Option<CameraSettings>,
    stats: CaptureStats,
    status: String,
    halt_reason: Option<String>,
}

impl<C: Camera> CaptureLoop<C> {
    pub fn new(camera: C, settings: CameraSettings) -> Self {
        Self {
            camera,
            state: CaptureState::Idle,
            settings,
            pending: None,
            stats: CaptureStats::default(),
            status: "Idle".to_string(),
            halt_reason: None,
        }
    }

    /// Apply the current settings and start the first exposure.
    pub fn start(&mut self) -> CameraResult<()> {
        if self.state != CaptureState::Idle {
            return Ok(());
        }
        self.halt_reason = None;
        let settings = self.settings;
        self.apply_settings(settings)?;
        self.expose()?;
        self.status = "Exposing".to_string();
        log::info!("{}: capture started", self.camera.name());
        Ok(())
    }

    /// Stop polling and abort the running exposure.
    pub fn stop(&mut self) {
        if self.state == CaptureState::Idle {
            return;
        }
        if let Err(e) = self.camera.stop_exposure() {
            log::warn!("{}: stop exposure failed: {e}", self.camera.name());
        }
        self.state = CaptureState::Idle;
        self.status = "Idle".to_string();
        log::info!("{}: capture stopped", self.camera.name());
    }

    /// Queue `settings` for the next exposure boundary.
    ///
    /// A later request replaces an earlier one that was not yet applied.
    pub fn request_settings(&mut self, settings: CameraSettings) {
        if self.state == CaptureState::Idle {
            self.settings = settings;
        } else {
            self.pending = Some(settings);
        }
    }

    /// Advance the state machine by one exposure-status query.
    pub fn poll(&mut self, sink: &mut impl FrameSink) -> PollOutcome {
        if self.state == CaptureState::Idle {
            return PollOutcome::Stopped;
        }
        let status = match self.camera.exposure_status() {
            Ok(status) => status,
            Err(e) => {
                log::warn!("{}: status query failed: {e}", self.camera.name());
                ExposureStatus::Failed
            }
        };

        match status {
            ExposureStatus::Working => PollOutcome::Waiting,
            ExposureStatus::Idle => {
                let reason = format!("{}: camera idle while exposing", self.camera.name());
                log::error!("{reason}");
                self.halt(reason);
                PollOutcome::Halted
            }
            ExposureStatus::Succeeded => {
                self.state = CaptureState::Succeeded;
                let outcome = match self.camera.fetch_frame() {
                    Ok(frame) if sink.is_rendering() => {
                        log::debug!("dropping frame #{}: render in flight", frame.sequence);
                        self.stats.dropped += 1;
                        PollOutcome::Dropped
                    }
                    Ok(frame) => {
                        sink.submit_frame(frame);
                        self.stats.delivered += 1;
                        PollOutcome::Delivered
                    }
                    Err(e) => {
                        log::warn!("{}: fetching frame failed: {e}", self.camera.name());
                        self.record_failure();
                        PollOutcome::Failed
                    }
                };
                self.restart(outcome)
            }
            ExposureStatus::Failed => {
                self.state = CaptureState::Failed;
                self.record_failure();
                self.restart(PollOutcome::Failed)
            }
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != CaptureState::Idle
    }

    /// Settings currently in effect on the device.
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    /// Why the loop stopped on its own, if it did.
    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn into_camera(self) -> C {
        self.camera
    }

    fn record_failure(&mut self) {
        self.stats.failures += 1;
        self.status = "Exposing after failure".to_string();
        log::warn!(
            "{}: exposure failed ({} so far)",
            self.camera.name(),
            self.stats.failures
        );
    }

    /// Apply queued settings and start the next exposure.
    fn restart(&mut self, outcome: PollOutcome) -> PollOutcome {
        if let Some(settings) = self.pending.take() {
            if let Err(e) = self.apply_settings(settings) {
                log::warn!("{}: applying settings failed: {e}", self.camera.name());
            }
        }
        match self.expose() {
            Ok(()) => {
                if outcome != PollOutcome::Failed {
                    self.status = "Exposing".to_string();
                }
                outcome
            }
            Err(e) => {
                let reason = format!("{}: cannot start exposure: {e}", self.camera.name());
                log::error!("{reason}");
                self.halt(reason);
                PollOutcome::Halted
            }
        }
    }

    fn expose(&mut self) -> CameraResult<()> {
        self.camera.start_exposure()?;
        self.stats.exposures += 1;
        self.state = CaptureState::Exposing;
        Ok(())
    }

    /// Push `settings` to the camera.
    ///
    /// A protocol rejection is not an error for the loop: the device's actual
    /// values are read back and become the current settings.
    fn apply_settings(&mut self, settings: CameraSettings) -> CameraResult<()> {
        match self.camera.apply_settings(&settings) {
            Ok(()) => {
                self.settings = settings;
                Ok(())
            }
            Err(CameraError::Protocol(msg)) => {
                log::warn!("{}: settings rejected: {msg}", self.camera.name());
                self.settings = self.camera.read_settings()?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn halt(&mut self, reason: String) {
        self.state = CaptureState::Idle;
        self.status = "Idle".to_string();
        self.halt_reason = Some(reason);
    }
}
