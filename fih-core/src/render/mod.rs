//! Asynchronous rendering under generation cancellation.

pub mod generation;
pub mod scheduler;
pub mod viewer;
mod worker;

pub use generation::{Generation, GenerationCounter, GenerationReader, Ticket};
pub use scheduler::{
    Checkpoint, CheckpointHook, FrameSource, RenderHandle, RenderMessage, RenderReason,
    RenderScheduler,
};
pub use viewer::{DisplaySink, ViewSource, Viewer, EMPTY_IMAGE};
