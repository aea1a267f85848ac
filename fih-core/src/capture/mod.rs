//! Live camera capture.

pub mod camera;
pub mod capture_loop;
pub mod mock;

pub use camera::{bayer_for_model, Camera, CapturedFrame};
pub use capture_loop::{CaptureLoop, CaptureState, CaptureStats, FrameSink, PollOutcome, POLL_INTERVAL};
pub use mock::MockCamera;
