//! Body of one render thread.

use std::sync::Arc;

use crossbeam_channel::Sender;
use fih_shared::{DisplayParameters, FocusOverlay};

use super::generation::Ticket;
use super::scheduler::{Checkpoint, CheckpointHook, FrameSource, RenderMessage};
use crate::focus::render_overlay;
use crate::io::load_frame;
use crate::pipeline::{render_frame, ProcessedFrame, Stage, Viewport};

/// A worker's connection back to the consumer.
pub(crate) struct WorkerLink {
    pub(crate) ticket: Ticket,
    pub(crate) hook: Option<CheckpointHook>,
    pub(crate) tx: Sender<RenderMessage>,
}

impl WorkerLink {
    fn checkpoint(&self, at: Checkpoint) -> bool {
        if let Some(hook) = &self.hook {
            hook(at, self.ticket.generation());
        }
        let current = self.ticket.is_current();
        if !current {
            log::debug!("render {} superseded at {at}", self.ticket.generation());
        }
        current
    }

    /// Post `msg` unless the render was superseded meanwhile.
    fn post(&self, msg: RenderMessage) {
        if !self.ticket.is_current() {
            return;
        }
        // Receiver gone means the consumer shut down
        let _ = self.tx.send(msg);
    }
}

pub(crate) struct RenderJob {
    pub(crate) source: FrameSource,
    pub(crate) params: DisplayParameters,
    pub(crate) viewport: Viewport,
    pub(crate) link: WorkerLink,
}

impl RenderJob {
    pub(crate) fn run(self) {
        let RenderJob {
            source,
            params,
            viewport,
            link,
        } = self;
        let generation = link.ticket.generation();
        let label = source.label();

        let (raw, reused) = match source {
            FrameSource::File(path) => match load_frame(&path) {
                Ok(frame) => (Arc::new(frame), None),
                Err(e) => {
                    log::warn!("cannot load {}: {e}", path.display());
                    let status = format!("Cannot load {}: {e}", path.display());
                    link.post(RenderMessage::LoadFailed {
                        generation,
                        path,
                        status,
                    });
                    return;
                }
            },
            FrameSource::Frame(frame) => (frame, None),
            FrameSource::Processed(frame) => (frame.raw_arc(), Some(frame)),
        };
        if !link.checkpoint(Checkpoint::PostLoad) {
            return;
        }

        let mut frame = match reused {
            Some(frame) => frame,
            None => match ProcessedFrame::resolve(raw) {
                Ok(frame) => Box::new(frame),
                Err(error) => {
                    log::warn!("{label}: {error}");
                    link.post(RenderMessage::Failed {
                        generation,
                        source: label,
                        error,
                    });
                    return;
                }
            },
        };
        if !link.checkpoint(Checkpoint::PostResolve) {
            return;
        }

        let completed = render_frame(&mut frame, &params, viewport, |stage| match stage {
            Stage::Resolved => true,
            Stage::Scaled => link.checkpoint(Checkpoint::PostScale),
            Stage::Stretched => link.checkpoint(Checkpoint::PostStretch),
        });
        if !completed {
            return;
        }

        let mut status = format!("Loaded {}", frame.raw().label());
        let mut star_count = None;
        if params.focus_overlay.is_active() {
            let settings = params.focus();
            match frame.take_catalog(&settings) {
                Ok(mut catalog) => {
                    if params.focus_overlay == FocusOverlay::Hfr && !catalog.has_hfr() {
                        catalog.compute_hfr();
                    }
                    let factor = frame.scale_factor();
                    if let Some(bitmap) = frame.bitmap_mut() {
                        if let Err(e) = render_overlay(
                            bitmap,
                            &catalog,
                            params.focus_overlay,
                            params.focus_show_values,
                            factor,
                        ) {
                            log::warn!("overlay skipped: {e}");
                        }
                    }
                    status.push_str(&format!(", found {} stars", catalog.len()));
                    star_count = Some(catalog.len());
                    frame.keep_catalog(settings, catalog);
                }
                Err(e) => log::warn!("star detection skipped: {e}"),
            }
        }
        if !link.checkpoint(Checkpoint::PostOverlay) {
            return;
        }

        let Some(bitmap) = frame.take_bitmap() else {
            return;
        };
        link.post(RenderMessage::Rendered {
            generation,
            bitmap,
            status,
            star_count,
            frame,
        });
    }
}
