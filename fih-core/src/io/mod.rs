//! Frame files on disk.

#[cfg(feature = "fits")]
pub mod fits;

use std::path::Path;

use crate::error::{LoadError, SaveError};
use crate::frame::RawFrame;

/// File extensions recognised as FITS images, compared case-insensitively.
pub const FITS_EXTENSIONS: [&str; 2] = ["fit", "fits"];

pub fn is_fits_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| FITS_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Load a frame file.
pub fn load_frame(path: &Path) -> Result<RawFrame, LoadError> {
    #[cfg(feature = "fits")]
    {
        fits::load_fits(path)
    }
    #[cfg(not(feature = "fits"))]
    {
        let _ = path;
        Err(LoadError::Unsupported)
    }
}

/// Write a frame file.
pub fn save_frame(frame: &RawFrame, path: &Path) -> Result<(), SaveError> {
    #[cfg(feature = "fits")]
    {
        fits::save_fits(frame, path)
    }
    #[cfg(not(feature = "fits"))]
    {
        let _ = (frame, path);
        Err(SaveError::Unsupported("FITS"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fits_path() {
        assert!(is_fits_path(Path::new("m31.fit")));
        assert!(is_fits_path(Path::new("/data/M31.FITS")));
        assert!(!is_fits_path(Path::new("m31.png")));
        assert!(!is_fits_path(Path::new("fits")));
    }
}
