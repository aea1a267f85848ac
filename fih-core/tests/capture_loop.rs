//! Free-running capture against a scripted camera.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{Gate, RecordingSink, TIMEOUT};
use fih_core::capture::{
    CaptureLoop, CaptureState, CapturedFrame, FrameSink, MockCamera, PollOutcome,
};
use fih_core::render::{Checkpoint, RenderScheduler, Viewer};
use fih_core::Viewport;
use fih_shared::ExposureStatus::{Failed, Succeeded, Working};
use fih_shared::{CameraSettings, DisplayParameters, PixelFormat};

#[derive(Default)]
struct CollectingSink {
    frames: Vec<CapturedFrame>,
    busy: bool,
}

impl FrameSink for CollectingSink {
    fn is_rendering(&self) -> bool {
        self.busy
    }

    fn submit_frame(&mut self, frame: CapturedFrame) {
        self.frames.push(frame);
    }
}

#[test]
fn test_status_sequence_reexposes_after_every_outcome() {
    let camera = MockCamera::new(8, 8).with_script([Working, Working, Succeeded, Failed, Succeeded]);
    let mut capture = CaptureLoop::new(camera, CameraSettings::default());
    let mut sink = CollectingSink::default();
    capture.start().unwrap();
    assert_eq!(capture.camera().exposures_started, 1);

    let outcomes: Vec<_> = (0..5).map(|_| capture.poll(&mut sink)).collect();
    assert_eq!(
        outcomes,
        [
            PollOutcome::Waiting,
            PollOutcome::Waiting,
            PollOutcome::Delivered,
            PollOutcome::Failed,
            PollOutcome::Delivered,
        ]
    );
    // Three re-exposures after the initial start
    assert_eq!(capture.camera().exposures_started, 4);
    assert_eq!(capture.stats().exposures, 4);
    assert_eq!(sink.frames.len(), 2);
    assert_eq!(capture.stats().failures, 1);
    assert_eq!(capture.state(), CaptureState::Exposing);
}

#[test]
fn test_busy_sink_drops_newest_frame() {
    let camera = MockCamera::new(8, 8).with_script([Succeeded, Succeeded]);
    let mut capture = CaptureLoop::new(camera, CameraSettings::default());
    let mut sink = CollectingSink {
        busy: true,
        ..Default::default()
    };
    capture.start().unwrap();
    assert_eq!(capture.poll(&mut sink), PollOutcome::Dropped);
    sink.busy = false;
    assert_eq!(capture.poll(&mut sink), PollOutcome::Delivered);
    assert_eq!(sink.frames.len(), 1);
    assert_eq!(sink.frames[0].sequence, 2);
    assert_eq!(capture.stats().dropped, 1);
}

#[test]
fn test_viewer_in_flight_render_drops_next_frame() {
    let gate = Gate::at(Checkpoint::PostLoad);
    let scheduler = RenderScheduler::new().with_checkpoint_hook(gate.hook.clone());
    let mut viewer = Viewer::with_scheduler(
        scheduler,
        RecordingSink::default(),
        DisplayParameters::default(),
        Viewport::new(16, 16),
    );
    viewer.start_live("Mock Camera");

    let settings = CameraSettings {
        format: PixelFormat::Mono16,
        ..Default::default()
    };
    let camera = MockCamera::new(16, 16).with_script([Succeeded, Succeeded]);
    let mut capture = CaptureLoop::new(camera, settings);
    capture.start().unwrap();

    assert_eq!(capture.poll(&mut viewer), PollOutcome::Delivered);
    gate.wait_arrival();
    assert_eq!(capture.poll(&mut viewer), PollOutcome::Dropped);

    gate.release();
    assert!(viewer.wait(TIMEOUT));
    let shown = &viewer.sink().shown;
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].1, "Loaded frame #1");
    assert_eq!(shown[0].0.get_pixel(0, 0).0, [4, 4, 4, 255]);
    assert_eq!(viewer.drain(), 0);
}

/// Block until the viewer's latest worker has exited, leaving its result
/// queued.
fn wait_for_worker(viewer: &Viewer<RecordingSink>) {
    let deadline = Instant::now() + TIMEOUT;
    while viewer.in_flight().is_some_and(|h| !h.is_finished()) {
        assert!(Instant::now() < deadline, "render did not finish");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_every_delivered_frame_is_shown_when_exposures_finish_every_tick() {
    let mut viewer = Viewer::new(
        RecordingSink::default(),
        DisplayParameters::default(),
        Viewport::new(16, 16),
    );
    viewer.start_live("Mock Camera");
    let camera = MockCamera::new(16, 16).with_script([Succeeded; 10]);
    let mut capture = CaptureLoop::new(camera, CameraSettings::default());
    capture.start().unwrap();

    for _ in 0..10 {
        capture.poll(&mut viewer);
        viewer.drain();
        // The render completes between ticks, before its result is applied
        wait_for_worker(&viewer);
    }
    viewer.drain();

    let stats = capture.stats();
    assert_eq!(stats.delivered + stats.dropped, 10);
    assert!(stats.delivered >= 5, "{stats:?}");
    assert_eq!(viewer.sink().shown.len(), stats.delivered);
    assert!(!viewer.is_rendering());
}

#[test]
fn test_rejected_setting_is_replaced_by_read_back() {
    let camera = MockCamera::new(8, 8)
        .with_max_gain(100)
        .with_script([Succeeded, Working]);
    let mut capture = CaptureLoop::new(camera, CameraSettings::default());
    let mut sink = CollectingSink::default();
    capture.start().unwrap();

    capture.request_settings(CameraSettings {
        gain: 300,
        exposure_us: 2_000,
        ..Default::default()
    });
    assert_eq!(capture.poll(&mut sink), PollOutcome::Delivered);
    assert!(capture.is_running());
    assert_eq!(capture.camera().reads, 1);
    assert_eq!(capture.settings().gain, 50);
    assert_eq!(capture.settings().exposure_us, 100_000);
    assert_eq!(capture.camera().exposures_started, 2);
}

#[test]
fn test_bayer_tag_travels_with_mono_frames() {
    let camera = MockCamera::new(8, 8).with_bayer("GRBG").with_script([Succeeded]);
    let mut capture = CaptureLoop::new(camera, CameraSettings::default());
    let mut sink = CollectingSink::default();
    capture.start().unwrap();
    capture.poll(&mut sink);

    let frame = fih_core::RawFrame::from_capture(&sink.frames[0]).unwrap();
    assert_eq!(frame.bayer(), Some("GRBG"));
    assert_eq!(frame.pixel_format(), Some(PixelFormat::Mono8));
}
