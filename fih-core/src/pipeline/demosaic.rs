//! Bilinear demosaicing of Bayer mosaics.

use ndarray::{Array3, ArrayView2};
use rayon::prelude::*;

use crate::frame::{BayerPattern, ChannelOrder};

/// A demosaiced three-channel buffer, indexed `[row, col, channel]`.
#[derive(Debug, Clone)]
pub struct ColorBuffer {
    pub data: Array3<f32>,
    pub order: ChannelOrder,
}

impl ColorBuffer {
    /// Storage index of the physical red and blue channels.
    pub fn red_blue_index(&self) -> (usize, usize) {
        match self.order {
            ChannelOrder::Rgb => (0, 2),
            ChannelOrder::Bgr => (2, 0),
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }
}

/// Interpolate the missing colours of every site from its 3x3 neighbourhood.
///
/// A site's own colour is copied through. Each missing colour is the mean of
/// the neighbours carrying it: the four edge neighbours for green at red/blue
/// sites, the two in-line neighbours for red/blue at green sites and the four
/// diagonals for red at blue sites (and vice versa). Border sites average
/// whatever neighbours exist.
pub fn demosaic(mosaic: ArrayView2<f32>, pattern: BayerPattern) -> ColorBuffer {
    let (height, width) = mosaic.dim();
    let mut out = vec![0.0f32; height * width * 3];

    if width > 0 {
        out.par_chunks_mut(width * 3)
            .enumerate()
            .for_each(|(row, line)| {
                for col in 0..width {
                    let mut sums = [0.0f32; 3];
                    let mut counts = [0u32; 3];
                    let own = pattern.color_at(row, col);

                    for dr in -1i64..=1 {
                        for dc in -1i64..=1 {
                            if dr == 0 && dc == 0 {
                                continue;
                            }
                            let r = row as i64 + dr;
                            let c = col as i64 + dc;
                            if r < 0 || c < 0 || r >= height as i64 || c >= width as i64 {
                                continue;
                            }
                            let (r, c) = (r as usize, c as usize);
                            let color = pattern.color_at(r, c);
                            sums[color] += mosaic[[r, c]];
                            counts[color] += 1;
                        }
                    }

                    let mut rgb = [0.0f32; 3];
                    for color in 0..3 {
                        rgb[color] = if color == own {
                            mosaic[[row, col]]
                        } else if counts[color] > 0 {
                            sums[color] / counts[color] as f32
                        } else {
                            0.0
                        };
                    }

                    let px = &mut line[col * 3..col * 3 + 3];
                    match pattern.order {
                        ChannelOrder::Rgb => px.copy_from_slice(&rgb),
                        ChannelOrder::Bgr => {
                            px[0] = rgb[2];
                            px[1] = rgb[1];
                            px[2] = rgb[0];
                        }
                    }
                }
            });
    }

    // Shape always matches the buffer length.
    let data = Array3::from_shape_vec((height, width, 3), out)
        .unwrap_or_else(|_| Array3::zeros((height, width, 3)));
    ColorBuffer {
        data,
        order: pattern.order,
    }
}
