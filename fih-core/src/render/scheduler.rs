//! Dispatch of render workers and collection of their results.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use fih_shared::DisplayParameters;
use image::RgbaImage;

use super::generation::{Generation, GenerationCounter, GenerationReader};
use super::worker::{RenderJob, WorkerLink};
use crate::error::PipelineError;
use crate::frame::RawFrame;
use crate::pipeline::{ProcessedFrame, Viewport};

/// Where a worker gets its pixels.
#[derive(Debug)]
pub enum FrameSource {
    File(PathBuf),
    Frame(Arc<RawFrame>),
    /// A frame already resolved by an earlier render; the worker takes over
    /// its cached planes, percentiles and stars.
    Processed(Box<ProcessedFrame>),
}

impl FrameSource {
    pub fn label(&self) -> String {
        match self {
            FrameSource::File(path) => path.display().to_string(),
            FrameSource::Frame(frame) => frame.label().to_string(),
            FrameSource::Processed(frame) => frame.raw().label().to_string(),
        }
    }
}

/// Why a render was requested; only used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReason {
    Open,
    Navigate,
    Parameters,
    Reload,
    Live,
}

/// Points at which a worker checks whether it is still wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    PostLoad,
    PostResolve,
    PostScale,
    PostStretch,
    PostOverlay,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Checkpoint::PostLoad => "post-load",
            Checkpoint::PostResolve => "post-resolve",
            Checkpoint::PostScale => "post-scale",
            Checkpoint::PostStretch => "post-stretch",
            Checkpoint::PostOverlay => "post-overlay",
        };
        f.write_str(name)
    }
}

/// Called by workers right before each checkpoint test.
pub type CheckpointHook = Arc<dyn Fn(Checkpoint, Generation) + Send + Sync>;

/// Result of one worker, posted to the consumer.
#[derive(Debug)]
pub enum RenderMessage {
    Rendered {
        generation: Generation,
        bitmap: RgbaImage,
        status: String,
        /// Stars found when an overlay was requested
        star_count: Option<usize>,
        /// Derived state to hand to the next render of the same frame
        frame: Box<ProcessedFrame>,
    },
    LoadFailed {
        generation: Generation,
        path: PathBuf,
        status: String,
    },
    Failed {
        generation: Generation,
        source: String,
        error: PipelineError,
    },
}

impl RenderMessage {
    pub fn generation(&self) -> Generation {
        match self {
            RenderMessage::Rendered { generation, .. }
            | RenderMessage::LoadFailed { generation, .. }
            | RenderMessage::Failed { generation, .. } => *generation,
        }
    }
}

/// A dispatched worker.
#[derive(Debug)]
pub struct RenderHandle {
    generation: Generation,
    done: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl RenderHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The worker has exited, whether or not it posted a result.
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Block until the worker exits.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// Sets the completion flag however the worker exits.
pub(crate) struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Owns the generation counter and the result channel.
///
/// Every submission supersedes all earlier ones; superseded workers stop at
/// their next checkpoint and post nothing.
pub struct RenderScheduler {
    counter: GenerationCounter,
    tx: Sender<RenderMessage>,
    rx: Receiver<RenderMessage>,
    hook: Option<CheckpointHook>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            counter: GenerationCounter::new(),
            tx,
            rx,
            hook: None,
        }
    }

    /// Install a hook run by workers before every checkpoint test.
    pub fn with_checkpoint_hook(mut self, hook: CheckpointHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Start a worker for `source` under a new generation.
    pub fn submit(
        &mut self,
        source: FrameSource,
        params: DisplayParameters,
        viewport: Viewport,
        reason: RenderReason,
    ) -> std::io::Result<RenderHandle> {
        let generation = self.counter.advance();
        let done = Arc::new(AtomicBool::new(false));
        log::debug!("render {generation} ({reason:?}): {}", source.label());

        let job = RenderJob {
            source,
            params,
            viewport,
            link: WorkerLink {
                ticket: self.counter.ticket(),
                hook: self.hook.clone(),
                tx: self.tx.clone(),
            },
        };
        let guard = DoneGuard(Arc::clone(&done));
        let thread = thread::Builder::new()
            .name(format!("render-{generation}"))
            .spawn(move || {
                let _guard = guard;
                job.run();
            })?;

        Ok(RenderHandle {
            generation,
            done,
            thread,
        })
    }

    /// Advance the generation without starting a worker, cancelling any
    /// render in flight.
    pub fn cancel(&mut self) -> Generation {
        self.counter.advance()
    }

    pub fn current(&self) -> Generation {
        self.counter.current()
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.counter.current() == generation
    }

    pub fn reader(&self) -> GenerationReader {
        self.counter.reader()
    }

    pub fn try_recv(&self) -> Option<RenderMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<RenderMessage, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}
