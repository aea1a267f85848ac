//! Pixel pipeline: raw frame to display bitmap.
//!
//! A [`ProcessedFrame`] resolves the raw planes into either a colour buffer
//! (demosaiced or native RGB) or a gray plane, then [`render_frame`] runs the
//! composition:
//!
//! 1. fit to viewport (area average down, bilinear up)
//! 2. stretch: percentile or calibration window, optional gamma, either per
//!    channel or on luma only in perceptual mode
//! 3. clip, round, cast to `u8`, optional inversion
//! 4. expand to RGBA
//!
//! The caller's gate is consulted between stages so a superseded render can
//! stop without producing output.

pub mod demosaic;
pub mod gray;
pub mod scale;
pub mod stretch;

use std::sync::Arc;

use fih_shared::{DisplayParameters, FocusSettings, StatsError};
use image::{Rgba, RgbaImage};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};
use once_cell::unsync::OnceCell;

use crate::error::PipelineError;
use crate::focus::StarCatalog;
use crate::frame::{BayerPattern, ChannelOrder, Planes, RawFrame};

pub use demosaic::{demosaic, ColorBuffer};
pub use gray::to_gray;
pub use scale::{scale_to_fit, Scaled};
pub use stretch::{gamma_stretch, PercentileCache, StretchWindow, PERCENTILES};

/// Display area a frame is fitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: usize,
    pub height: usize,
}

impl Viewport {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 960)
    }
}

/// Resolved pixel planes; a frame is either colour or gray, never both.
#[derive(Debug, Clone)]
pub enum FramePlanes {
    Color(ColorBuffer),
    Gray(Array2<f32>),
}

/// Points at which [`render_frame`] asks whether to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolved,
    Scaled,
    Stretched,
}

/// Derived state of one raw frame.
///
/// Lives as long as its raw frame is on display and is handed from worker to
/// worker, so the demosaiced planes, luminance, percentile table and star
/// catalog are computed once per frame. Only one worker owns it at a time.
#[derive(Debug)]
pub struct ProcessedFrame {
    raw: Arc<RawFrame>,
    planes: FramePlanes,
    luminance: OnceCell<Array2<f32>>,
    percentiles: PercentileCache,
    catalog: Option<(FocusSettings, StarCatalog)>,
    bitmap: Option<RgbaImage>,
    scale_factor: f64,
}

fn luminance_of<'a>(planes: &'a FramePlanes, cache: &'a OnceCell<Array2<f32>>) -> ArrayView2<'a, f32> {
    match planes {
        FramePlanes::Gray(g) => g.view(),
        FramePlanes::Color(c) => cache.get_or_init(|| to_gray(c.data.view(), c.order)).view(),
    }
}

impl ProcessedFrame {
    /// Demosaic or adopt the raw planes.
    ///
    /// Fails with [`PipelineError::EmptyFrame`] for a zero-sized frame and
    /// [`PipelineError::UnsupportedPattern`] for an unknown Bayer tag.
    pub fn resolve(raw: Arc<RawFrame>) -> Result<Self, PipelineError> {
        if raw.is_empty() {
            return Err(PipelineError::EmptyFrame);
        }
        let planes = match raw.planes() {
            Planes::Mono(data) => match raw.bayer().map(BayerPattern::parse).transpose()? {
                Some(Some(pattern)) => FramePlanes::Color(demosaic(data.view(), pattern)),
                _ => FramePlanes::Gray(data.clone()),
            },
            Planes::Rgb(data) => FramePlanes::Color(ColorBuffer {
                data: data.clone(),
                order: ChannelOrder::Rgb,
            }),
        };
        Ok(Self {
            raw,
            planes,
            luminance: OnceCell::new(),
            percentiles: PercentileCache::new(),
            catalog: None,
            bitmap: None,
            scale_factor: 1.0,
        })
    }

    pub fn raw(&self) -> &RawFrame {
        &self.raw
    }

    pub fn raw_arc(&self) -> Arc<RawFrame> {
        Arc::clone(&self.raw)
    }

    /// Whether this state was derived from `raw` itself.
    pub fn is_derived_from(&self, raw: &Arc<RawFrame>) -> bool {
        Arc::ptr_eq(&self.raw, raw)
    }

    pub fn planes(&self) -> &FramePlanes {
        &self.planes
    }

    pub fn is_color(&self) -> bool {
        matches!(self.planes, FramePlanes::Color(_))
    }

    /// Full-resolution gray plane; computed once for colour frames.
    pub fn gray(&self) -> ArrayView2<'_, f32> {
        luminance_of(&self.planes, &self.luminance)
    }

    /// Display window for `params`: percentile bucket or calibration levels,
    /// warped by the gamma setting.
    pub fn stretch_window(&mut self, params: &DisplayParameters) -> StretchWindow {
        let gray = luminance_of(&self.planes, &self.luminance);
        let (low, high) = self
            .percentiles
            .window(gray, params.histogram_stretch)
            .unwrap_or((self.raw.black(), self.raw.white()));
        StretchWindow::new(low, high, params.gamma)
    }

    /// Percentile passes made over this frame so far.
    pub fn percentile_passes(&self) -> usize {
        self.percentiles.passes()
    }

    /// Star catalog kept from an earlier render, if any.
    pub fn catalog(&self) -> Option<&StarCatalog> {
        self.catalog.as_ref().map(|(_, catalog)| catalog)
    }

    /// Take the catalog measured with `settings`, detecting stars when none
    /// was kept or it was measured with other settings.
    pub fn take_catalog(&mut self, settings: &FocusSettings) -> Result<StarCatalog, StatsError> {
        match self.catalog.take() {
            Some((used, catalog)) if used == *settings => Ok(catalog),
            _ => StarCatalog::evaluate(self.gray(), settings),
        }
    }

    /// Keep `catalog` for later renders with the same `settings`.
    pub fn keep_catalog(&mut self, settings: FocusSettings, catalog: StarCatalog) {
        self.catalog = Some((settings, catalog));
    }

    /// Bitmap of the latest completed composition.
    pub fn bitmap(&self) -> Option<&RgbaImage> {
        self.bitmap.as_ref()
    }

    pub fn bitmap_mut(&mut self) -> Option<&mut RgbaImage> {
        self.bitmap.as_mut()
    }

    pub fn take_bitmap(&mut self) -> Option<RgbaImage> {
        self.bitmap.take()
    }

    /// Source pixels per bitmap pixel of the latest composition.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}

/// Compose the display bitmap of `frame`.
///
/// Returns `false` when `gate` asked to stop; the frame's bitmap is then
/// left untouched.
pub fn render_frame(
    frame: &mut ProcessedFrame,
    params: &DisplayParameters,
    viewport: Viewport,
    mut gate: impl FnMut(Stage) -> bool,
) -> bool {
    let window = frame.stretch_window(params);
    let use_gray = params.force_gray || !frame.is_color();
    let red_blue = match &frame.planes {
        FramePlanes::Color(c) if !use_gray => Some(c.red_blue_index()),
        _ => None,
    };
    let source: ArrayView3<f32> = match &frame.planes {
        FramePlanes::Color(c) if !use_gray => c.data.view(),
        _ => frame.gray().insert_axis(Axis(2)),
    };
    if !gate(Stage::Resolved) {
        return false;
    }

    let mut scaled = if params.scale {
        scale_to_fit(source, viewport)
    } else {
        Scaled {
            image: source.to_owned(),
            factor: 1.0,
        }
    };
    if !gate(Stage::Scaled) {
        return false;
    }

    match red_blue {
        Some((red, blue)) if params.perceptual_mode => {
            stretch::stretch_luma(scaled.image.view_mut(), red, blue, window)
        }
        _ => stretch::stretch_channels(scaled.image.view_mut(), window),
    }
    let bitmap = to_bitmap(&scaled.image, params.invert);
    if !gate(Stage::Stretched) {
        return false;
    }

    frame.bitmap = Some(bitmap);
    frame.scale_factor = scaled.factor;
    true
}

/// Cast display-unit samples to an RGBA bitmap, replicating gray planes.
fn to_bitmap(img: &ndarray::Array3<f32>, invert: bool) -> RgbaImage {
    let (h, w, channels) = img.dim();
    let cast = |v: f32| {
        let b = stretch::to_display_u8(v);
        if invert {
            255 - b
        } else {
            b
        }
    };
    RgbaImage::from_fn(w as u32, h as u32, |x, y| {
        let (r, c) = (y as usize, x as usize);
        if channels >= 3 {
            Rgba([
                cast(img[[r, c, 0]]),
                cast(img[[r, c, 1]]),
                cast(img[[r, c, 2]]),
                255,
            ])
        } else {
            let g = cast(img[[r, c, 0]]);
            Rgba([g, g, g, 255])
        }
    })
}
