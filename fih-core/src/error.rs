//! Error types for frame loading, the pixel pipeline and camera control.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a file into a [`crate::frame::RawFrame`].
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "fits")]
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::compat::errors::Error),
    #[error("no 2-D image HDU in {0}")]
    NoImage(PathBuf),
    #[error("invalid image shape: {0}")]
    Shape(String),
    #[error("FITS support is not compiled in")]
    Unsupported,
}

/// Failure to write a frame to disk.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "fits")]
    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::compat::errors::Error),
    #[error("cannot save {0} frames")]
    Unsupported(&'static str),
}

/// Failures of the pixel pipeline proper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("frame has no pixel data")]
    EmptyFrame,
    #[error("unsupported Bayer pattern '{0}'")]
    UnsupportedPattern(String),
}

/// Failures converting a camera delivery into a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unsupported pixel format code {0}")]
    UnsupportedFormat(i32),
    #[error("buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Errors reported by a camera backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    /// The device refused a control value
    #[error("camera rejected request: {0}")]
    Protocol(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("hardware error: {0}")]
    Hardware(String),
}

pub type CameraResult<T> = Result<T, CameraError>;

/// Errors from saved-session storage.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HOME not set")]
    NoHome,
}
