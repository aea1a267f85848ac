//! FITS frame reading and writing.
//!
//! Rows stay in file order so a `BAYERPAT` phase in the header lines up with
//! the pixel grid.

use std::path::Path;

use fitsio::compat::fitsfile::FitsFile;
use fitsio::compat::hdu::FitsHdu;
use fitsio::compat::images::{ImageDescription, ImageType, ReadImage, WriteImage};
use ndarray::Array2;

use crate::error::{LoadError, SaveError};
use crate::frame::{Planes, RawFrame};

/// Header key holding the calibration black level.
pub const KEY_BLACK: &str = "CBLACK";
/// Header key holding the calibration white level.
pub const KEY_WHITE: &str = "CWHITE";
/// Header key holding the Bayer tag.
pub const KEY_BAYER: &str = "BAYERPAT";

/// Numeric header value, accepting integer or real cards.
fn read_number(fptr: &FitsFile, hdu: &FitsHdu, key: &str) -> Option<f64> {
    if let Ok(v) = hdu.read_key::<i64>(fptr, key) {
        return Some(v as f64);
    }
    hdu.read_key::<String>(fptr, key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
}

/// Display range implied by the sample type when the header has no
/// calibration keys.
fn default_levels(bitpix: i64, bzero: f64, plane: &Array2<f32>) -> (f32, f32) {
    match bitpix {
        8 => (0.0, 255.0),
        16 if bzero == 32768.0 => (0.0, 65535.0),
        16 => (i16::MIN as f32, i16::MAX as f32),
        32 => (i32::MIN as f32, i32::MAX as f32),
        64 => (i64::MIN as f32, i64::MAX as f32),
        _ => plane
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((0.0, 1.0)),
    }
}

/// Read the first two-dimensional image HDU of `path`.
pub fn load_fits(path: &Path) -> Result<RawFrame, LoadError> {
    let fptr = FitsFile::open(path)?;

    let mut hdu_idx = 0;
    while let Ok(hdu) = fptr.hdu(hdu_idx) {
        hdu_idx += 1;
        if hdu.read_key::<i64>(&fptr, "NAXIS").unwrap_or(0) != 2 {
            continue;
        }
        let width = hdu.read_key::<i64>(&fptr, "NAXIS1")?.max(0) as usize;
        let height = hdu.read_key::<i64>(&fptr, "NAXIS2")?.max(0) as usize;
        let bitpix = hdu.read_key::<i64>(&fptr, "BITPIX")?;
        let bzero = read_number(&fptr, &hdu, "BZERO").unwrap_or(0.0);

        let samples: Vec<f32> = if width * height == 0 {
            Vec::new()
        } else {
            f64::read_image(&fptr, &hdu)?
                .into_iter()
                .map(|v| v as f32)
                .collect()
        };
        let plane = Array2::from_shape_vec((height, width), samples).map_err(|e| {
            LoadError::Shape(format!("{}: {e}", path.display()))
        })?;

        let (default_black, default_white) = default_levels(bitpix, bzero, &plane);
        let black = read_number(&fptr, &hdu, KEY_BLACK).map_or(default_black, |v| v as f32);
        let white = read_number(&fptr, &hdu, KEY_WHITE).map_or(default_white, |v| v as f32);

        let mut frame = RawFrame::mono(plane, bitpix.abs() as i32, black, white);
        if let Ok(tag) = hdu.read_key::<String>(&fptr, KEY_BAYER) {
            frame = frame.with_bayer(tag.trim().trim_matches('\'').trim());
        }
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::info!(
            "loaded {label}: {width}x{height}, BITPIX {bitpix}, levels {black}..{white}, bayer {:?}",
            frame.bayer()
        );
        return Ok(frame.with_label(label));
    }

    Err(LoadError::NoImage(path.to_path_buf()))
}

/// Write a monochrome or mosaic frame with its calibration keys.
///
/// 8-bit frames are stored as unsigned bytes, everything else as 32-bit
/// integers.
pub fn save_fits(frame: &RawFrame, path: &Path) -> Result<(), SaveError> {
    let Planes::Mono(plane) = frame.planes() else {
        return Err(SaveError::Unsupported("RGB"));
    };
    let (height, width) = plane.dim();
    let eight_bit = frame.bits_per_sample() == 8;
    let description = ImageDescription {
        data_type: if eight_bit {
            ImageType::UnsignedByte
        } else {
            ImageType::Long
        },
        dimensions: vec![width, height],
    };

    let mut fptr = FitsFile::create(path).overwrite().open()?;
    let hdu = fptr.create_image("PRIMARY", &description)?;
    if eight_bit {
        let data: Vec<u8> = plane.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
        u8::write_image(&mut fptr, &hdu, &data)?;
    } else {
        let data: Vec<i32> = plane.iter().map(|&v| v.round() as i32).collect();
        i32::write_image(&mut fptr, &hdu, &data)?;
    }

    hdu.write_key(&mut fptr, KEY_BLACK, &(frame.black().round() as i64))?;
    hdu.write_key(&mut fptr, KEY_WHITE, &(frame.white().round() as i64))?;
    if let Some(tag) = frame.bayer() {
        hdu.write_key(&mut fptr, KEY_BAYER, &tag.to_string())?;
    }
    log::debug!("saved {} to {}", frame.label(), path.display());
    Ok(())
}
