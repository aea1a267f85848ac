//! Core of the FIT image helper.
//!
//! Turns sensor frames from FITS files or a live camera into display bitmaps,
//! scores focus quality with star detection, and runs every render on its own
//! thread under generation-counter cancellation.

pub mod capture;
pub mod config_storage;
pub mod error;
pub mod focus;
pub mod frame;
pub mod io;
pub mod navigation;
pub mod pipeline;
pub mod render;

pub use error::{CameraError, ConfigError, FrameError, LoadError, PipelineError, SaveError};
pub use frame::{BayerPattern, Planes, RawFrame};
pub use pipeline::{render_frame, ProcessedFrame, Viewport};
pub use render::{DisplaySink, RenderScheduler, Viewer};
