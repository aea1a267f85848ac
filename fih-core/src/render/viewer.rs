//! The single consumer of render results.
//!
//! A [`Viewer`] owns the display parameters and the current source and is the
//! only place where anything visible changes. Results are applied from
//! [`Viewer::drain`], which the owner calls once per tick of its loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fih_shared::DisplayParameters;
use image::RgbaImage;

use super::generation::Generation;
use super::scheduler::{FrameSource, RenderHandle, RenderMessage, RenderReason, RenderScheduler};
use crate::capture::{CapturedFrame, FrameSink};
use crate::frame::RawFrame;
use crate::navigation::{FrameList, Navigate, SortOrder};
use crate::pipeline::{ProcessedFrame, Viewport};

/// Status shown when a frame cannot be turned into pixels.
pub const EMPTY_IMAGE: &str = "Empty Image";

/// Receiver of everything the viewer wants to show.
pub trait DisplaySink {
    fn show(&mut self, bitmap: &RgbaImage, status: &str);

    fn status(&mut self, text: &str);

    /// The named source could not be rendered.
    fn source_broken(&mut self, source: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewSource {
    Empty,
    File(PathBuf),
    Directory(PathBuf),
    Camera(String),
}

pub struct Viewer<S: DisplaySink> {
    scheduler: RenderScheduler,
    sink: S,
    params: DisplayParameters,
    viewport: Viewport,
    source: ViewSource,
    current_file: Option<PathBuf>,
    frames: Option<FrameList>,
    cached: Option<Arc<RawFrame>>,
    /// Derived state of `cached`, absent while a worker owns it
    processed: Option<Box<ProcessedFrame>>,
    in_flight: Option<RenderHandle>,
    /// Live render whose result has not been applied yet
    redrawing: Option<Generation>,
    live_dropped: usize,
}

impl<S: DisplaySink> Viewer<S> {
    pub fn new(sink: S, params: DisplayParameters, viewport: Viewport) -> Self {
        Self::with_scheduler(RenderScheduler::new(), sink, params, viewport)
    }

    pub fn with_scheduler(
        scheduler: RenderScheduler,
        sink: S,
        params: DisplayParameters,
        viewport: Viewport,
    ) -> Self {
        Self {
            scheduler,
            sink,
            params,
            viewport,
            source: ViewSource::Empty,
            current_file: None,
            frames: None,
            cached: None,
            processed: None,
            in_flight: None,
            redrawing: None,
            live_dropped: 0,
        }
    }

    pub fn params(&self) -> &DisplayParameters {
        &self.params
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn source(&self) -> &ViewSource {
        &self.source
    }

    pub fn frames(&self) -> Option<&FrameList> {
        self.frames.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Raw frame of the last applied render.
    pub fn current_frame(&self) -> Option<&Arc<RawFrame>> {
        self.cached.as_ref()
    }

    /// Derived state of the current frame, unless a render has it.
    pub fn processed_frame(&self) -> Option<&ProcessedFrame> {
        self.processed.as_deref()
    }

    /// The most recently dispatched worker.
    pub fn in_flight(&self) -> Option<&RenderHandle> {
        self.in_flight.as_ref()
    }

    fn forget_frame(&mut self) {
        self.cached = None;
        self.processed = None;
    }

    fn is_live(&self) -> bool {
        matches!(self.source, ViewSource::Camera(_))
    }

    fn submit(&mut self, source: FrameSource, reason: RenderReason) {
        match self
            .scheduler
            .submit(source, self.params, self.viewport, reason)
        {
            Ok(handle) => self.in_flight = Some(handle),
            Err(e) => {
                log::error!("cannot spawn render worker: {e}");
                self.in_flight = None;
            }
        }
    }

    fn submit_file(&mut self, path: PathBuf, reason: RenderReason) {
        self.forget_frame();
        self.current_file = Some(path.clone());
        self.submit(FrameSource::File(path), reason);
    }

    /// Show a single file.
    pub fn open_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.frames = None;
        self.source = ViewSource::File(path.clone());
        self.submit_file(path, RenderReason::Open);
    }

    /// Browse a directory, starting at its last file.
    pub fn open_directory(&mut self, dir: impl Into<PathBuf>, order: SortOrder) -> std::io::Result<()> {
        let dir = dir.into();
        let mut list = FrameList::scan(&dir, order)?;
        self.source = ViewSource::Directory(dir.clone());
        self.current_file = None;
        self.forget_frame();
        let first = list.select(Navigate::Last).map(Path::to_path_buf);
        self.frames = Some(list);
        match first {
            Some(path) => self.submit_file(path, RenderReason::Open),
            None => {
                self.scheduler.cancel();
                self.sink
                    .status(&format!("No FITS files in {}", dir.display()));
            }
        }
        Ok(())
    }

    /// Move within the directory listing; does nothing when not browsing or
    /// when the cursor does not move.
    pub fn navigate(&mut self, nav: Navigate) -> bool {
        let Some(path) = self
            .frames
            .as_mut()
            .and_then(|list| list.select(nav))
            .map(Path::to_path_buf)
        else {
            return false;
        };
        self.submit_file(path, RenderReason::Navigate);
        true
    }

    /// Re-scan the directory and jump to its newest entry when the listing
    /// changed.
    pub fn reload_directory(&mut self) -> std::io::Result<bool> {
        let Some(list) = self.frames.as_mut() else {
            return Ok(false);
        };
        if !list.reload()? {
            return Ok(false);
        }
        if let Some(path) = list.select(Navigate::Last).map(Path::to_path_buf) {
            self.submit_file(path, RenderReason::Reload);
        }
        Ok(true)
    }

    /// Replace the display parameters and re-render the current source.
    ///
    /// While a camera feeds frames the next delivery picks them up instead.
    pub fn set_parameters(&mut self, params: DisplayParameters) {
        self.params = params;
        if self.is_live() {
            return;
        }
        if let Some(frame) = self.processed.take() {
            self.submit(FrameSource::Processed(frame), RenderReason::Parameters);
        } else if let Some(frame) = self.cached.clone() {
            self.submit(FrameSource::Frame(frame), RenderReason::Parameters);
        } else if let Some(path) = self.current_file.clone() {
            self.submit(FrameSource::File(path), RenderReason::Parameters);
        }
    }

    /// Change the display area and re-render.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        let params = self.params;
        self.set_parameters(params);
    }

    /// Switch to a live camera feed.
    pub fn start_live(&mut self, camera: impl Into<String>) {
        self.frames = None;
        self.current_file = None;
        self.forget_frame();
        self.redrawing = None;
        self.live_dropped = 0;
        self.scheduler.cancel();
        self.source = ViewSource::Camera(camera.into());
    }

    pub fn stop_live(&mut self) {
        if self.is_live() {
            self.source = ViewSource::Empty;
        }
    }

    /// Live frames that could not be converted.
    pub fn live_dropped(&self) -> usize {
        self.live_dropped
    }

    fn prefixed(&self, status: &str) -> String {
        match self.frames.as_ref().and_then(FrameList::position_prefix) {
            Some(prefix) => format!("{prefix}{status}"),
            None => status.to_string(),
        }
    }

    fn mark_current_broken(&mut self, label: &str) {
        if let (Some(list), Some(path)) = (self.frames.as_mut(), self.current_file.as_ref()) {
            list.mark_broken(path);
        }
        self.sink.source_broken(label);
    }

    /// Apply one message. Returns `false` for a superseded result.
    fn apply(&mut self, msg: RenderMessage) -> bool {
        if self.redrawing == Some(msg.generation()) {
            self.redrawing = None;
        }
        if !self.scheduler.is_current(msg.generation()) {
            log::debug!("discarding result of render {}", msg.generation());
            if let RenderMessage::Rendered { frame, .. } = msg {
                self.recover(frame);
            }
            return false;
        }
        match msg {
            RenderMessage::Rendered {
                bitmap,
                status,
                frame,
                ..
            } => {
                let status = self.prefixed(&status);
                self.cached = Some(frame.raw_arc());
                self.processed = Some(frame);
                self.sink.show(&bitmap, &status);
            }
            RenderMessage::LoadFailed { path, status, .. } => {
                let status = self.prefixed(&status);
                self.sink.status(&status);
                self.mark_current_broken(&path.display().to_string());
            }
            RenderMessage::Failed { source, .. } => {
                let status = self.prefixed(EMPTY_IMAGE);
                self.sink.status(&status);
                self.mark_current_broken(&source);
            }
        }
        true
    }

    /// Keep the derived state of a superseded render when it belongs to the
    /// frame on display and nothing else holds it.
    fn recover(&mut self, frame: Box<ProcessedFrame>) {
        if self.processed.is_none()
            && self.cached.as_ref().is_some_and(|raw| frame.is_derived_from(raw))
        {
            self.processed = Some(frame);
        }
    }

    /// Apply every result that has arrived. Returns how many were current.
    pub fn drain(&mut self) -> usize {
        // A worker posts before it exits, so once it has exited its result
        // (if any) is already queued
        let exited = self.in_flight.as_ref().is_some_and(RenderHandle::is_finished);
        let mut applied = 0;
        while let Some(msg) = self.scheduler.try_recv() {
            if self.apply(msg) {
                applied += 1;
            }
        }
        if exited && self.redrawing.take().is_some() {
            log::debug!("live render exited without a result");
        }
        applied
    }

    /// Block until a current result has been applied or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.scheduler.recv_timeout(remaining) {
                Ok(msg) => {
                    if self.apply(msg) {
                        return true;
                    }
                }
                Err(_) => return false,
            }
        }
    }
}

impl<S: DisplaySink> FrameSink for Viewer<S> {
    /// Busy from the submission of a live frame until its result has been
    /// applied or its render superseded.
    fn is_rendering(&self) -> bool {
        self.redrawing
            .is_some_and(|generation| self.scheduler.is_current(generation))
    }

    fn submit_frame(&mut self, frame: CapturedFrame) {
        match RawFrame::from_capture(&frame) {
            Ok(raw) => {
                self.submit(FrameSource::Frame(Arc::new(raw)), RenderReason::Live);
                self.redrawing = self.in_flight.as_ref().map(RenderHandle::generation);
            }
            Err(e) => {
                self.live_dropped += 1;
                log::warn!("dropping frame #{}: {e}", frame.sequence);
            }
        }
    }
}
