//! Generation cancellation and result delivery across real worker threads.

mod common;

use std::sync::Arc;

use common::{flat_frame, star_frame, Gate, RecordingSink, TIMEOUT};
use fih_core::capture::{CapturedFrame, FrameSink};
use fih_core::render::{
    Checkpoint, FrameSource, RenderMessage, RenderReason, RenderScheduler, Viewer, EMPTY_IMAGE,
};
use fih_core::{Planes, RawFrame, Viewport};
use fih_shared::{DisplayParameters, FocusOverlay, PixelFormat, StretchBucket};

fn overlay_params() -> DisplayParameters {
    DisplayParameters {
        focus_overlay: FocusOverlay::Sharpness,
        focus_threshold_sigma: 8.0,
        ..Default::default()
    }
}

fn field() -> Arc<RawFrame> {
    Arc::new(star_frame(
        96,
        96,
        &[(20.0, 20.0, 2000.0), (60.0, 30.0, 1500.0), (40.0, 70.0, 1000.0)],
    ))
}

#[test]
fn test_superseded_worker_posts_nothing_at_any_checkpoint() {
    let checkpoints = [
        Checkpoint::PostLoad,
        Checkpoint::PostResolve,
        Checkpoint::PostScale,
        Checkpoint::PostStretch,
        Checkpoint::PostOverlay,
    ];
    for at in checkpoints {
        let gate = Gate::at(at);
        let mut scheduler = RenderScheduler::new().with_checkpoint_hook(gate.hook.clone());
        let viewport = Viewport::new(48, 48);

        let stale = scheduler
            .submit(FrameSource::Frame(field()), overlay_params(), viewport, RenderReason::Open)
            .unwrap();
        assert_eq!(gate.wait_arrival(), stale.generation());

        let fresh = scheduler
            .submit(
                FrameSource::Frame(field()),
                overlay_params(),
                viewport,
                RenderReason::Parameters,
            )
            .unwrap();
        gate.release();
        let stale_generation = stale.generation();
        stale.join().unwrap();
        fresh.join().unwrap();

        let mut messages = Vec::new();
        while let Some(msg) = scheduler.try_recv() {
            messages.push(msg);
        }
        assert_eq!(messages.len(), 1, "stopped at {at}");
        assert_eq!(messages[0].generation(), scheduler.current());

        // The superseded worker went no further than the gate
        let seen = gate.visited_by(stale_generation);
        assert_eq!(seen.last(), Some(&at));
    }
}

#[test]
fn test_render_without_overlay_passes_every_checkpoint() {
    let gate = Gate::at(Checkpoint::PostOverlay);
    let mut scheduler = RenderScheduler::new().with_checkpoint_hook(gate.hook.clone());
    let handle = scheduler
        .submit(
            FrameSource::Frame(field()),
            DisplayParameters::default(),
            Viewport::new(48, 48),
            RenderReason::Open,
        )
        .unwrap();
    let generation = gate.wait_arrival();
    gate.release();
    handle.join().unwrap();

    assert_eq!(
        gate.visited_by(generation),
        [
            Checkpoint::PostLoad,
            Checkpoint::PostResolve,
            Checkpoint::PostScale,
            Checkpoint::PostStretch,
            Checkpoint::PostOverlay,
        ]
    );
    assert!(matches!(
        scheduler.try_recv(),
        Some(RenderMessage::Rendered {
            star_count: None,
            ..
        })
    ));
}

#[test]
fn test_rendered_message_carries_stars_and_status() {
    let mut scheduler = RenderScheduler::new();
    let handle = scheduler
        .submit(
            FrameSource::Frame(field()),
            overlay_params(),
            Viewport::new(48, 48),
            RenderReason::Open,
        )
        .unwrap();
    let msg = scheduler.recv_timeout(TIMEOUT).unwrap();
    handle.join().unwrap();

    match msg {
        RenderMessage::Rendered {
            bitmap,
            status,
            star_count,
            ..
        } => {
            assert_eq!(bitmap.dimensions(), (48, 48));
            assert_eq!(star_count, Some(3));
            assert_eq!(status, "Loaded synthetic, found 3 stars");
        }
        other => panic!("unexpected {other:?}"),
    }
}

fn render_once(scheduler: &mut RenderScheduler, source: FrameSource, params: DisplayParameters) -> RenderMessage {
    let handle = scheduler
        .submit(source, params, Viewport::new(48, 48), RenderReason::Parameters)
        .unwrap();
    let msg = scheduler.recv_timeout(TIMEOUT).unwrap();
    handle.join().unwrap();
    msg
}

#[test]
fn test_blank_pixels_keep_star_detection() {
    let frame = star_frame(96, 96, &[(20.0, 20.0, 2000.0), (60.0, 30.0, 1500.0)]);
    let Planes::Mono(data) = frame.planes() else {
        panic!("expected a mono plane");
    };
    let mut data = data.clone();
    data[[0, 0]] = f32::NAN;
    // Stacked frames often carry a blank border
    data.row_mut(95).fill(f32::NAN);
    let stacked = RawFrame::mono(data, -32, 0.0, 65535.0).with_label("stacked");

    let mut scheduler = RenderScheduler::new();
    match render_once(&mut scheduler, FrameSource::Frame(Arc::new(stacked)), overlay_params()) {
        RenderMessage::Rendered {
            status, star_count, ..
        } => {
            assert_eq!(star_count, Some(2));
            assert_eq!(status, "Loaded stacked, found 2 stars");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_processed_frame_carries_caches_to_next_render() {
    let mut scheduler = RenderScheduler::new();
    let params = DisplayParameters {
        histogram_stretch: StretchBucket::Bucket10,
        ..overlay_params()
    };
    let RenderMessage::Rendered { frame, .. } =
        render_once(&mut scheduler, FrameSource::Frame(field()), params)
    else {
        panic!("first render failed");
    };
    assert_eq!(frame.percentile_passes(), 1);
    assert_eq!(frame.catalog().map(|c| c.len()), Some(3));

    // Another bucket, inversion and HFR markers reuse the same derived state
    let changed = DisplayParameters {
        histogram_stretch: StretchBucket::Bucket50,
        invert: true,
        focus_overlay: FocusOverlay::Hfr,
        ..params
    };
    let RenderMessage::Rendered {
        frame, star_count, ..
    } = render_once(&mut scheduler, FrameSource::Processed(frame), changed)
    else {
        panic!("second render failed");
    };
    assert_eq!(frame.percentile_passes(), 1);
    assert_eq!(star_count, Some(3));
    let catalog = frame.catalog().unwrap();
    assert!(catalog.has_hfr());
}

#[test]
fn test_live_parameter_change_waits_for_next_frame() {
    let gate = Gate::at(Checkpoint::PostScale);
    let scheduler = RenderScheduler::new().with_checkpoint_hook(gate.hook.clone());
    let mut viewer = Viewer::with_scheduler(
        scheduler,
        RecordingSink::default(),
        DisplayParameters::default(),
        Viewport::new(50, 50),
    );
    viewer.start_live("mock");
    viewer.submit_frame(CapturedFrame {
        sequence: 1,
        width: 100,
        height: 100,
        format_code: PixelFormat::Mono16.code(),
        bayer: None,
        pixels: 1000u16.to_le_bytes().repeat(100 * 100),
    });
    gate.wait_arrival();
    assert!(viewer.is_rendering());

    // Inverting while the first render is parked: the live path does not
    // resubmit, so the parked render stays current
    viewer.set_parameters(DisplayParameters {
        invert: true,
        ..Default::default()
    });
    gate.release();
    assert!(viewer.wait(TIMEOUT));
    let (bitmap, status) = &viewer.sink().shown[0];
    assert_eq!(status, "Loaded frame #1");
    assert!(bitmap.pixels().all(|p| p.0 == [4, 4, 4, 255]));
}

#[test]
fn test_flat_frame_renders_four_everywhere() {
    let mut scheduler = RenderScheduler::new();
    let handle = scheduler
        .submit(
            FrameSource::Frame(Arc::new(flat_frame(100, 100, 1000.0))),
            DisplayParameters::default(),
            Viewport::default(),
            RenderReason::Open,
        )
        .unwrap();
    handle.join().unwrap();
    match scheduler.try_recv() {
        Some(RenderMessage::Rendered { bitmap, status, .. }) => {
            assert_eq!(bitmap.dimensions(), (960, 960));
            assert!(bitmap.pixels().all(|p| p.0 == [4, 4, 4, 255]));
            assert_eq!(status, "Loaded flat");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_unknown_bayer_tag_reports_empty_image() {
    let mut viewer = Viewer::new(
        RecordingSink::default(),
        DisplayParameters::default(),
        Viewport::new(32, 32),
    );
    viewer.start_live("mock");
    viewer.submit_frame(CapturedFrame {
        sequence: 7,
        width: 8,
        height: 8,
        format_code: PixelFormat::Mono8.code(),
        bayer: Some("XYZW".into()),
        pixels: vec![10; 64],
    });
    assert!(viewer.wait(TIMEOUT));
    let sink = viewer.sink();
    assert!(sink.shown.is_empty());
    assert_eq!(sink.statuses, [EMPTY_IMAGE]);
    assert_eq!(sink.broken, ["frame #7"]);
}

#[test]
fn test_unknown_pixel_format_is_dropped() {
    let mut viewer = Viewer::new(
        RecordingSink::default(),
        DisplayParameters::default(),
        Viewport::new(32, 32),
    );
    viewer.start_live("mock");
    viewer.submit_frame(CapturedFrame {
        sequence: 1,
        width: 4,
        height: 4,
        format_code: 9,
        bayer: None,
        pixels: vec![0; 16],
    });
    assert_eq!(viewer.live_dropped(), 1);
    assert!(!viewer.is_rendering());
    assert_eq!(viewer.drain(), 0);
    assert!(viewer.sink().statuses.is_empty());
}
