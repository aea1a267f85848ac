//! `fih`: render FITS frames, browse directories and run the capture loop
//! from the command line.
//!
//! ```bash
//! fih render m31.fits --stretch 10 --overlay hfr --show-values
//! fih browse /data/night1 --all --out-dir png/
//! fih browse /data/night1 --watch --watch-secs 600
//! fih capture -n 10 --format raw16 --save-dir capture/
//! fih config save m31 --target /data/night1 --stretch 50
//! fih --session m31 browse /data/night1
//! ```

mod args;
mod sink;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::tick;
use fih_core::capture::{
    CaptureLoop, CapturedFrame, FrameSink, MockCamera, PollOutcome, POLL_INTERVAL,
};
use fih_core::config_storage::{ConfigStorage, SavedSession, Target};
use fih_core::io::save_frame;
use fih_core::navigation::Navigate;
use fih_core::{RawFrame, Viewer};
use fih_shared::ExposureStatus;

use args::{Cli, Commands, ConfigAction};
use sink::PngSink;

/// Upper bound on a single render.
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);
/// Directory rescan period in watch mode.
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);

fn load_session(name: Option<&str>) -> Result<SavedSession> {
    let Some(name) = name else {
        return Ok(SavedSession::default());
    };
    let path = Path::new(name);
    if path.is_file() {
        return SavedSession::load_from_file(path)
            .with_context(|| format!("loading session {}", path.display()));
    }
    let storage = ConfigStorage::new()?;
    match storage.get_session(name) {
        Some(session) => Ok(session?),
        None => bail!(
            "no session '{name}' in {}",
            storage.root_path().display()
        ),
    }
}

fn run_render(file: PathBuf, viewer: &mut Viewer<PngSink>) -> Result<()> {
    viewer.open_file(&file);
    if !viewer.wait(RENDER_TIMEOUT) {
        bail!("rendering {} timed out", file.display());
    }
    if viewer.sink().written().is_empty() {
        bail!("{}", viewer.sink().last_status());
    }
    Ok(())
}

fn run_browse(
    viewer: &mut Viewer<PngSink>,
    dir: &Path,
    order: fih_core::navigation::SortOrder,
    all: bool,
    watch: bool,
    watch_secs: Option<u64>,
) -> Result<()> {
    viewer
        .open_directory(dir, order)
        .with_context(|| format!("listing {}", dir.display()))?;
    if all && viewer.navigate(Navigate::First) {
        log::debug!("rendering every file of {}", dir.display());
    }
    viewer.wait(RENDER_TIMEOUT);
    while all && viewer.navigate(Navigate::Next) {
        viewer.wait(RENDER_TIMEOUT);
    }

    if watch {
        let deadline = watch_secs.map(|s| Instant::now() + Duration::from_secs(s));
        let ticker = tick(RELOAD_INTERVAL);
        log::info!("watching {}", dir.display());
        for _ in ticker.iter() {
            if viewer.reload_directory()? {
                log::info!("{} changed", dir.display());
            }
            viewer.drain();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
        }
    }

    let sink = viewer.sink();
    println!(
        "{} rendered, {} broken",
        sink.written().len(),
        sink.broken()
    );
    Ok(())
}

/// Forwards live frames to the viewer, optionally saving them first.
struct CaptureSink<'a> {
    viewer: &'a mut Viewer<PngSink>,
    save_dir: Option<&'a Path>,
}

impl FrameSink for CaptureSink<'_> {
    fn is_rendering(&self) -> bool {
        self.viewer.is_rendering()
    }

    fn submit_frame(&mut self, frame: CapturedFrame) {
        if let Some(dir) = self.save_dir {
            let path = dir.join(format!("capture_{:05}.fits", frame.sequence));
            match RawFrame::from_capture(&frame) {
                Ok(raw) => {
                    if let Err(e) = save_frame(&raw, &path) {
                        log::warn!("cannot save {}: {e}", path.display());
                    }
                }
                Err(e) => log::warn!("not saving frame #{}: {e}", frame.sequence),
            }
        }
        self.viewer.submit_frame(frame);
    }
}

fn run_capture(
    viewer: &mut Viewer<PngSink>,
    session: &SavedSession,
    frames: usize,
    size: (usize, usize),
    save_dir: Option<PathBuf>,
) -> Result<()> {
    let save_dir = save_dir.or_else(|| session.capture_dir.clone());
    if let Some(dir) = &save_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let script = std::iter::repeat([ExposureStatus::Working, ExposureStatus::Succeeded])
        .take(frames * 4)
        .flatten();
    let camera = MockCamera::new(size.0, size.1).with_script(script);
    viewer.start_live("Mock Camera");
    let mut capture = CaptureLoop::new(camera, session.camera);
    capture.start()?;

    let ticker = tick(POLL_INTERVAL);
    let mut delivered = 0;
    for _ in ticker.iter() {
        let outcome = {
            let mut sink = CaptureSink {
                viewer: &mut *viewer,
                save_dir: save_dir.as_deref(),
            };
            capture.poll(&mut sink)
        };
        viewer.drain();
        match outcome {
            PollOutcome::Delivered => delivered += 1,
            PollOutcome::Halted | PollOutcome::Stopped => {
                bail!(
                    "capture stopped: {}",
                    capture.halt_reason().unwrap_or("camera idle")
                );
            }
            _ => {}
        }
        if delivered >= frames {
            break;
        }
    }
    capture.stop();
    viewer.wait(RENDER_TIMEOUT);
    viewer.stop_live();

    let stats = capture.stats();
    println!(
        "{} exposures, {} delivered, {} dropped, {} failed",
        stats.exposures, stats.delivered, stats.dropped, stats.failures
    );
    Ok(())
}

fn run_config(action: ConfigAction, session: SavedSession) -> Result<()> {
    let storage = ConfigStorage::new()?;
    match action {
        ConfigAction::List => {
            for name in storage.list_sessions()? {
                println!("{name}");
            }
        }
        ConfigAction::Show { name } => {
            let session = storage
                .get_session(&name)
                .with_context(|| format!("no session '{name}'"))??;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        ConfigAction::Save {
            name,
            target,
            camera,
            display,
        } => {
            let target = match target {
                Some(path) if path.is_dir() => Target::Multi {
                    path,
                    order: Default::default(),
                },
                Some(path) => Target::Single { path },
                None => session.target.clone(),
            };
            let saved = SavedSession {
                display: display.apply(session.display),
                camera: camera.apply(session.camera),
                target,
                capture_dir: session.capture_dir.clone(),
            };
            let path = storage.save_session(&name, &saved)?;
            println!("saved {}", path.display());
        }
        ConfigAction::Delete { name } => {
            if !storage.delete_session(&name)? {
                bail!("no session '{name}'");
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let session = load_session(cli.session.as_deref())?;

    match cli.command {
        Commands::Render {
            file,
            output,
            display,
        } => {
            let output = output.unwrap_or_else(|| file.with_extension("png"));
            let mut viewer = Viewer::new(
                PngSink::single(&output),
                display.apply(session.display),
                display.viewport(),
            );
            run_render(file, &mut viewer)
        }
        Commands::Browse {
            dir,
            out_dir,
            sort,
            all,
            watch,
            watch_secs,
            display,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut viewer = Viewer::new(
                PngSink::numbered(out_dir),
                display.apply(session.display),
                display.viewport(),
            );
            run_browse(&mut viewer, &dir, sort.into(), all, watch, watch_secs)
        }
        Commands::Capture {
            frames,
            out_dir,
            save_dir,
            width,
            height,
            camera,
            display,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let session = SavedSession {
                camera: camera.apply(session.camera),
                ..session
            };
            let mut viewer = Viewer::new(
                PngSink::numbered(out_dir),
                display.apply(session.display),
                display.viewport(),
            );
            run_capture(&mut viewer, &session, frames, (width, height), save_dir)
        }
        Commands::Config { action } => run_config(action, session),
    }
}
