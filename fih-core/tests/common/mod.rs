//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use fih_core::render::{Checkpoint, CheckpointHook, DisplaySink, Generation};
use fih_core::RawFrame;
use image::RgbaImage;
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// 16-bit frame with Gaussian stars `(x, y, amplitude)` on a noisy sky.
pub fn star_frame(width: usize, height: usize, stars: &[(f64, f64, f64)]) -> RawFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(12345);
    let noise = Normal::new(100.0f64, 3.0).unwrap();
    // FWHM 3 px
    let sigma = 3.0 / 2.3548;
    let data = Array2::from_shape_fn((height, width), |(y, x)| {
        let mut v = noise.sample(&mut rng);
        for &(sx, sy, amp) in stars {
            let (dx, dy) = (x as f64 - sx, y as f64 - sy);
            v += amp * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        }
        v.round().clamp(0.0, 65535.0) as f32
    });
    RawFrame::mono(data, 16, 0.0, 65535.0).with_label("synthetic")
}

pub fn flat_frame(width: usize, height: usize, value: f32) -> RawFrame {
    RawFrame::mono(Array2::from_elem((height, width), value), 16, 0.0, 65535.0).with_label("flat")
}

/// Display sink that records everything it is told.
#[derive(Default)]
pub struct RecordingSink {
    pub shown: Vec<(RgbaImage, String)>,
    pub statuses: Vec<String>,
    pub broken: Vec<String>,
}

impl DisplaySink for RecordingSink {
    fn show(&mut self, bitmap: &RgbaImage, status: &str) {
        self.shown.push((bitmap.clone(), status.to_string()));
    }

    fn status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }

    fn source_broken(&mut self, source: &str) {
        self.broken.push(source.to_string());
    }
}

/// Checkpoint hook that holds the first worker reaching `at` until released.
pub struct Gate {
    pub hook: CheckpointHook,
    pub arrived: Receiver<Generation>,
    pub visited: Arc<Mutex<Vec<(Checkpoint, Generation)>>>,
    release: Sender<()>,
}

impl Gate {
    pub fn at(at: Checkpoint) -> Self {
        let (arrived_tx, arrived) = bounded(1);
        let (release, release_rx) = bounded::<()>(1);
        let armed = AtomicBool::new(true);
        let visited = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&visited);
        let hook: CheckpointHook = Arc::new(move |cp, generation| {
            log.lock().unwrap().push((cp, generation));
            if cp == at && armed.swap(false, Ordering::AcqRel) {
                arrived_tx.send(generation).unwrap();
                let _ = release_rx.recv_timeout(TIMEOUT);
            }
        });
        Self {
            hook,
            arrived,
            visited,
            release,
        }
    }

    /// Block until a worker is parked at the gate.
    pub fn wait_arrival(&self) -> Generation {
        self.arrived.recv_timeout(TIMEOUT).unwrap()
    }

    pub fn release(&self) {
        self.release.send(()).unwrap();
    }

    pub fn visited_by(&self, generation: Generation) -> Vec<Checkpoint> {
        self.visited
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, g)| *g == generation)
            .map(|(cp, _)| *cp)
            .collect()
    }
}
