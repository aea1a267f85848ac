//! Display sink that writes every shown bitmap to a PNG file.

use std::path::{Path, PathBuf};

use fih_core::DisplaySink;
use image::RgbaImage;

pub struct PngSink {
    out_dir: PathBuf,
    /// Fixed output file; otherwise a numbered name per bitmap
    fixed: Option<PathBuf>,
    written: Vec<PathBuf>,
    broken: usize,
    last_status: String,
}

impl PngSink {
    /// Write every bitmap to `out_dir/NNNN.png`.
    pub fn numbered(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            fixed: None,
            written: Vec::new(),
            broken: 0,
            last_status: String::new(),
        }
    }

    /// Write every bitmap to `path`.
    pub fn single(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let out_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            fixed: Some(path),
            ..Self::numbered(out_dir)
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn broken(&self) -> usize {
        self.broken
    }

    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    fn next_path(&self) -> PathBuf {
        match &self.fixed {
            Some(path) => path.clone(),
            None => self.out_dir.join(format!("{:04}.png", self.written.len() + 1)),
        }
    }
}

impl DisplaySink for PngSink {
    fn show(&mut self, bitmap: &RgbaImage, status: &str) {
        self.last_status = status.to_string();
        let path = self.next_path();
        match bitmap.save(&path) {
            Ok(()) => {
                println!("{status} -> {}", path.display());
                self.written.push(path);
            }
            Err(e) => log::error!("cannot write {}: {e}", path.display()),
        }
    }

    fn status(&mut self, text: &str) {
        self.last_status = text.to_string();
        println!("{text}");
    }

    fn source_broken(&mut self, source: &str) {
        self.broken += 1;
        log::warn!("broken source: {source}");
    }
}
