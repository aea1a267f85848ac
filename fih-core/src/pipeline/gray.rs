//! Luminance conversion.

use ndarray::{Array2, ArrayView3, Axis, Zip};

use crate::frame::ChannelOrder;

/// BT.601 luma weights for R, G, B.
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Weighted sum `0.299 R + 0.587 G + 0.114 B` of a three-channel buffer.
///
/// `order` says which storage channel holds red, so the result is the same
/// for direct and swapped buffers of the same scene.
pub fn to_gray(color: ArrayView3<f32>, order: ChannelOrder) -> Array2<f32> {
    let (r_idx, b_idx) = match order {
        ChannelOrder::Rgb => (0, 2),
        ChannelOrder::Bgr => (2, 0),
    };
    let red = color.index_axis(Axis(2), r_idx);
    let green = color.index_axis(Axis(2), 1);
    let blue = color.index_axis(Axis(2), b_idx);

    let mut gray = Array2::<f32>::zeros(red.raw_dim());
    Zip::from(&mut gray)
        .and(&red)
        .and(&green)
        .and(&blue)
        .par_for_each(|g, &r, &gr, &b| {
            *g = LUMA_WEIGHTS[0] * r + LUMA_WEIGHTS[1] * gr + LUMA_WEIGHTS[2] * b;
        });
    gray
}
