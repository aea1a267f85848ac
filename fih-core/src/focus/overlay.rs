//! Star markers drawn over the display bitmap.
//!
//! Markers and labels are written as an SVG document, rasterised with resvg
//! and alpha-blended onto the bitmap.

use std::fmt::Write as _;
use std::sync::Arc;

use image::RgbaImage;
use once_cell::sync::Lazy;
use thiserror::Error;
use tiny_skia::{Pixmap, Transform};
use usvg::{Options, Tree};

/// Marker radius in bitmap pixels.
pub const MARKER_RADIUS: f64 = 10.0;

const GREEN: &str = "#00ff00";
const RED: &str = "#ff0000";

static FONT_DB: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    Arc::new(db)
});

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to parse overlay SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("cannot allocate {0}x{1} overlay")]
    Pixmap(u32, u32),
}

/// One marker in bitmap coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    /// Metric passed the threshold
    pub good: bool,
    pub label: Option<String>,
}

/// Build the SVG document for `markers` on a `width` x `height` canvas.
pub fn markers_svg(width: u32, height: u32, markers: &[Marker]) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#
    );
    for m in markers {
        let color = if m.good { GREEN } else { RED };
        let _ = write!(
            svg,
            r#"<circle cx="{:.2}" cy="{:.2}" r="{MARKER_RADIUS}" fill="none" stroke="{color}" stroke-width="1"/>"#,
            m.x, m.y
        );
        if let Some(label) = &m.label {
            let _ = write!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="12" fill="{color}">{label}</text>"#,
                m.x + MARKER_RADIUS + 2.0,
                m.y + 4.0
            );
        }
    }
    svg.push_str("</svg>");
    svg
}

/// Rasterise `markers` and blend them onto `bitmap`.
pub fn draw_markers(bitmap: &mut RgbaImage, markers: &[Marker]) -> Result<(), OverlayError> {
    if markers.is_empty() {
        return Ok(());
    }
    let (width, height) = bitmap.dimensions();
    let svg = markers_svg(width, height, markers);

    let mut options = Options::default();
    options.fontdb = Arc::clone(&FONT_DB);
    let tree = Tree::from_str(&svg, &options)?;
    let mut pixmap = Pixmap::new(width, height).ok_or(OverlayError::Pixmap(width, height))?;
    resvg::render(&tree, Transform::identity(), &mut pixmap.as_mut());

    for (x, y, pixel) in bitmap.enumerate_pixels_mut() {
        let Some(overlay) = pixmap.pixel(x, y) else {
            continue;
        };
        let alpha = overlay.alpha();
        if alpha == 0 {
            continue;
        }
        // Overlay is premultiplied
        let keep = 255 - alpha as u16;
        let blend = |base: u8, over: u8| (over as u16 + (base as u16 * keep + 127) / 255).min(255) as u8;
        pixel.0[0] = blend(pixel.0[0], overlay.red());
        pixel.0[1] = blend(pixel.0[1], overlay.green());
        pixel.0[2] = blend(pixel.0[2], overlay.blue());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_svg_contains_markers_and_labels() {
        let markers = vec![
            Marker {
                x: 12.0,
                y: 20.5,
                good: true,
                label: Some("0.53".into()),
            },
            Marker {
                x: 40.0,
                y: 8.0,
                good: false,
                label: None,
            },
        ];
        let svg = markers_svg(64, 32, &markers);
        assert!(svg.contains(r#"cx="12.00" cy="20.50" r="10""#));
        assert!(svg.contains(GREEN));
        assert!(svg.contains(RED));
        assert!(svg.contains(">0.53</text>"));
        assert_eq!(svg.matches("<circle").count(), 2);
    }

    #[test]
    fn test_draw_markers_paints_ring() {
        let mut bitmap = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        let markers = vec![Marker {
            x: 32.5,
            y: 32.5,
            good: true,
            label: None,
        }];
        draw_markers(&mut bitmap, &markers).unwrap();
        // Point on the ring is green, centre untouched
        let ring = bitmap.get_pixel(42, 32);
        assert!(ring.0[1] > 100);
        assert_eq!(ring.0[0], 0);
        assert_eq!(bitmap.get_pixel(32, 32).0, [0, 0, 0, 255]);
    }
}
