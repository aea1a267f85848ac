//! Raw sensor frames and colour-filter-array descriptions.

use std::fmt;

use fih_shared::PixelFormat;
use ndarray::{Array2, Array3};

use crate::capture::CapturedFrame;
use crate::error::{FrameError, PipelineError};

/// Arrangement of the 2x2 colour filter tile, named by its first two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfaLayout {
    Grbg,
    Rggb,
    Bggr,
    Gbrg,
}

/// Order of the channels in a demosaiced buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    /// Channel 0 is red
    Rgb,
    /// Channel 0 is blue
    Bgr,
}

/// One of the eight supported demosaic variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BayerPattern {
    pub layout: CfaLayout,
    pub order: ChannelOrder,
}

const RED: usize = 0;
const GREEN: usize = 1;
const BLUE: usize = 2;

impl BayerPattern {
    pub const fn new(layout: CfaLayout, order: ChannelOrder) -> Self {
        Self { layout, order }
    }

    /// Parse a header/driver tag such as `GRBG` or `RGGBi`.
    ///
    /// A trailing `i` selects the swapped (BGR) channel order. An empty tag or
    /// `NONE` means the frame is not mosaiced.
    pub fn parse(tag: &str) -> Result<Option<Self>, PipelineError> {
        let tag = tag.trim();
        if tag.is_empty() || tag.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        let unsupported = || PipelineError::UnsupportedPattern(tag.to_string());
        let (base, order) = match tag.len() {
            4 => (tag, ChannelOrder::Rgb),
            5 if tag.ends_with(['i', 'I']) => (&tag[..4], ChannelOrder::Bgr),
            _ => return Err(unsupported()),
        };
        let layout = match base.to_ascii_uppercase().as_str() {
            "GRBG" => CfaLayout::Grbg,
            "RGGB" => CfaLayout::Rggb,
            "BGGR" => CfaLayout::Bggr,
            "GBRG" => CfaLayout::Gbrg,
            _ => return Err(unsupported()),
        };
        Ok(Some(Self::new(layout, order)))
    }

    /// Physical colour (0 red, 1 green, 2 blue) of the filter over `(row, col)`.
    pub fn color_at(&self, row: usize, col: usize) -> usize {
        let tile = match self.layout {
            CfaLayout::Grbg => [[GREEN, RED], [BLUE, GREEN]],
            CfaLayout::Rggb => [[RED, GREEN], [GREEN, BLUE]],
            CfaLayout::Bggr => [[BLUE, GREEN], [GREEN, RED]],
            CfaLayout::Gbrg => [[GREEN, BLUE], [RED, GREEN]],
        };
        tile[row % 2][col % 2]
    }
}

impl fmt::Display for BayerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.layout {
            CfaLayout::Grbg => "GRBG",
            CfaLayout::Rggb => "RGGB",
            CfaLayout::Bggr => "BGGR",
            CfaLayout::Gbrg => "GBRG",
        };
        match self.order {
            ChannelOrder::Rgb => f.write_str(base),
            ChannelOrder::Bgr => write!(f, "{base}i"),
        }
    }
}

/// Pixel planes as delivered by the source.
#[derive(Debug, Clone)]
pub enum Planes {
    /// Single plane: monochrome or Bayer mosaic, indexed `[row, col]`
    Mono(Array2<f32>),
    /// Three planes in R, G, B order, indexed `[row, col, channel]`
    Rgb(Array3<f32>),
}

/// An immutable frame as read from a file or camera.
///
/// Shared between render workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RawFrame {
    planes: Planes,
    bits_per_sample: i32,
    black: f32,
    white: f32,
    bayer: Option<String>,
    format: Option<PixelFormat>,
    label: String,
}

impl RawFrame {
    pub fn new(planes: Planes, bits_per_sample: i32, black: f32, white: f32) -> Self {
        Self {
            planes,
            bits_per_sample,
            black,
            white,
            bayer: None,
            format: None,
            label: String::new(),
        }
    }

    pub fn mono(data: Array2<f32>, bits_per_sample: i32, black: f32, white: f32) -> Self {
        Self::new(Planes::Mono(data), bits_per_sample, black, white)
    }

    /// Attach the Bayer tag found in the file header or driver.
    pub fn with_bayer(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.bayer = if tag.trim().is_empty() { None } else { Some(tag) };
        self
    }

    /// Name shown in status messages.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Build a frame from a camera delivery.
    ///
    /// RGB24 buffers arrive in B, G, R byte order and are reordered to RGB.
    pub fn from_capture(capture: &CapturedFrame) -> Result<Self, FrameError> {
        let format = PixelFormat::from_code(capture.format_code)
            .ok_or(FrameError::UnsupportedFormat(capture.format_code))?;
        let (w, h) = (capture.width, capture.height);
        let expected = w * h * format.bytes_per_pixel();
        if capture.pixels.len() < expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: capture.pixels.len(),
            });
        }
        let bytes = &capture.pixels[..expected];

        let planes = match format {
            PixelFormat::Mono8 | PixelFormat::MonoY8 => {
                Planes::Mono(Array2::from_shape_fn((h, w), |(r, c)| bytes[r * w + c] as f32))
            }
            PixelFormat::Mono16 => Planes::Mono(Array2::from_shape_fn((h, w), |(r, c)| {
                let i = 2 * (r * w + c);
                u16::from_le_bytes([bytes[i], bytes[i + 1]]) as f32
            })),
            PixelFormat::Rgb24 => Planes::Rgb(Array3::from_shape_fn((h, w, 3), |(r, c, ch)| {
                bytes[3 * (r * w + c) + (2 - ch)] as f32
            })),
        };

        let bits = if format == PixelFormat::Mono16 { 16 } else { 8 };
        let mut frame = Self::new(planes, bits, 0.0, format.white_level());
        frame.format = Some(format);
        if matches!(format, PixelFormat::Mono8 | PixelFormat::Mono16) {
            if let Some(tag) = &capture.bayer {
                frame = frame.with_bayer(tag.clone());
            }
        }
        Ok(frame.with_label(format!("frame #{}", capture.sequence)))
    }

    pub fn planes(&self) -> &Planes {
        &self.planes
    }

    pub fn width(&self) -> usize {
        match &self.planes {
            Planes::Mono(a) => a.ncols(),
            Planes::Rgb(a) => a.dim().1,
        }
    }

    pub fn height(&self) -> usize {
        match &self.planes {
            Planes::Mono(a) => a.nrows(),
            Planes::Rgb(a) => a.dim().0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// FITS-style BITPIX of the source samples (negative for floats).
    pub fn bits_per_sample(&self) -> i32 {
        self.bits_per_sample
    }

    /// Calibration black level.
    pub fn black(&self) -> f32 {
        self.black
    }

    /// Calibration white level.
    pub fn white(&self) -> f32 {
        self.white
    }

    pub fn bayer(&self) -> Option<&str> {
        self.bayer.as_deref()
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_variants() {
        for base in ["GRBG", "RGGB", "BGGR", "GBRG"] {
            let direct = BayerPattern::parse(base).unwrap().unwrap();
            assert_eq!(direct.order, ChannelOrder::Rgb);
            assert_eq!(direct.to_string(), base);

            let swapped = BayerPattern::parse(&format!("{base}i")).unwrap().unwrap();
            assert_eq!(swapped.order, ChannelOrder::Bgr);
            assert_eq!(swapped.layout, direct.layout);
        }
        assert_eq!(BayerPattern::parse("NONE").unwrap(), None);
        assert_eq!(BayerPattern::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(
            BayerPattern::parse("RGBW"),
            Err(PipelineError::UnsupportedPattern("RGBW".to_string()))
        );
        assert!(BayerPattern::parse("GRBGx").is_err());
        assert!(BayerPattern::parse("GR").is_err());
    }

    #[test]
    fn test_color_at_tiles() {
        let rggb = BayerPattern::new(CfaLayout::Rggb, ChannelOrder::Rgb);
        assert_eq!(rggb.color_at(0, 0), RED);
        assert_eq!(rggb.color_at(0, 1), GREEN);
        assert_eq!(rggb.color_at(1, 0), GREEN);
        assert_eq!(rggb.color_at(1, 1), BLUE);
        let gbrg = BayerPattern::new(CfaLayout::Gbrg, ChannelOrder::Rgb);
        assert_eq!(gbrg.color_at(2, 3), BLUE);
        assert_eq!(gbrg.color_at(3, 2), RED);
    }

    #[test]
    fn test_from_capture_mono16() {
        let capture = CapturedFrame {
            sequence: 3,
            width: 2,
            height: 1,
            format_code: PixelFormat::Mono16.code(),
            bayer: Some("GRBG".into()),
            pixels: vec![0xe8, 0x03, 0xff, 0xff],
        };
        let frame = RawFrame::from_capture(&capture).unwrap();
        let Planes::Mono(data) = frame.planes() else {
            panic!("expected mono planes");
        };
        assert_eq!(data[[0, 0]], 1000.0);
        assert_eq!(data[[0, 1]], 65535.0);
        assert_eq!(frame.white(), 65535.0);
        assert_eq!(frame.bayer(), Some("GRBG"));
        assert_eq!(frame.label(), "frame #3");
    }

    #[test]
    fn test_from_capture_rgb24_and_y8() {
        let rgb = CapturedFrame {
            sequence: 0,
            width: 1,
            height: 1,
            format_code: PixelFormat::Rgb24.code(),
            bayer: Some("GRBG".into()),
            pixels: vec![10, 20, 30],
        };
        let frame = RawFrame::from_capture(&rgb).unwrap();
        let Planes::Rgb(data) = frame.planes() else {
            panic!("expected rgb planes");
        };
        assert_eq!(data[[0, 0, 0]], 30.0);
        assert_eq!(data[[0, 0, 2]], 10.0);
        assert_eq!(frame.bayer(), None);

        let y8 = CapturedFrame {
            format_code: PixelFormat::MonoY8.code(),
            pixels: vec![7],
            ..rgb
        };
        assert_eq!(RawFrame::from_capture(&y8).unwrap().bayer(), None);
    }

    #[test]
    fn test_from_capture_rejects_bad_input() {
        let capture = CapturedFrame {
            sequence: 0,
            width: 4,
            height: 4,
            format_code: 9,
            bayer: None,
            pixels: vec![0; 16],
        };
        assert_eq!(
            RawFrame::from_capture(&capture).unwrap_err(),
            FrameError::UnsupportedFormat(9)
        );
        let short = CapturedFrame {
            format_code: PixelFormat::Mono16.code(),
            ..capture
        };
        assert!(matches!(
            RawFrame::from_capture(&short),
            Err(FrameError::BufferSize { expected: 32, .. })
        ));
    }
}
