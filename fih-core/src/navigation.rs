//! Browsing the FITS files of a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::io::is_fits_path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Name,
    Modified,
}

/// A navigation request against a [`FrameList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigate {
    First,
    Last,
    Next,
    Previous,
    /// Re-select the current entry even though it did not change
    Redraw,
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub broken: bool,
}

/// Sorted listing of a directory's FITS files with a cursor.
#[derive(Debug, Clone)]
pub struct FrameList {
    dir: PathBuf,
    order: SortOrder,
    entries: Vec<FrameEntry>,
    current: Option<usize>,
}

fn scan_dir(dir: &Path, order: SortOrder) -> io::Result<Vec<FrameEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if !meta.is_file() || !is_fits_path(&path) {
            continue;
        }
        entries.push(FrameEntry {
            path,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            broken: false,
        });
    }
    match order {
        SortOrder::Name => entries.sort_by(|a, b| a.path.cmp(&b.path)),
        SortOrder::Modified => {
            entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)))
        }
    }
    Ok(entries)
}

impl FrameList {
    pub fn scan(dir: impl Into<PathBuf>, order: SortOrder) -> io::Result<Self> {
        let dir = dir.into();
        let entries = scan_dir(&dir, order)?;
        log::info!("{}: {} FITS files", dir.display(), entries.len());
        Ok(Self {
            dir,
            order,
            entries,
            current: None,
        })
    }

    /// Re-read the directory.
    ///
    /// Returns `true` when the listing (names or timestamps) changed; the
    /// cursor is then cleared and broken marks of surviving files are kept.
    pub fn reload(&mut self) -> io::Result<bool> {
        let mut fresh = scan_dir(&self.dir, self.order)?;
        let unchanged = fresh.len() == self.entries.len()
            && fresh
                .iter()
                .zip(&self.entries)
                .all(|(a, b)| a.path == b.path && a.modified == b.modified);
        if unchanged {
            return Ok(false);
        }
        for entry in &mut fresh {
            entry.broken = self
                .entries
                .iter()
                .any(|old| old.broken && old.path == entry.path);
        }
        log::debug!(
            "{}: listing changed, {} -> {} files",
            self.dir.display(),
            self.entries.len(),
            fresh.len()
        );
        self.entries = fresh;
        self.current = None;
        Ok(true)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.map(|i| self.entries[i].path.as_path())
    }

    /// Move the cursor.
    ///
    /// Indices are clamped to the list. `Next` and `Previous` step over
    /// broken entries. Returns the newly selected path, or `None` when the
    /// list is empty or the cursor did not move.
    pub fn select(&mut self, nav: Navigate) -> Option<&Path> {
        let last = self.entries.len().checked_sub(1)?;
        let target = match (nav, self.current) {
            (Navigate::First, _) => 0,
            (Navigate::Last, _) => last,
            (Navigate::Index(i), _) => i.min(last),
            (Navigate::Redraw, Some(i)) => i,
            (Navigate::Redraw, None) => return None,
            (Navigate::Next, Some(i)) => (i + 1..=last).find(|&j| !self.entries[j].broken)?,
            (Navigate::Next, None) => 0,
            (Navigate::Previous, Some(i)) => (0..i).rev().find(|&j| !self.entries[j].broken)?,
            (Navigate::Previous, None) => last,
        };
        if self.current == Some(target) && nav != Navigate::Redraw {
            return None;
        }
        self.current = Some(target);
        Some(self.entries[target].path.as_path())
    }

    /// Flag `path` as unreadable.
    pub fn mark_broken(&mut self, path: &Path) -> bool {
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => {
                entry.broken = true;
                true
            }
            None => false,
        }
    }

    /// Status prefix `"(i/n) "` for the current entry.
    pub fn position_prefix(&self) -> Option<String> {
        self.current
            .map(|i| format!("({}/{}) ", i + 1, self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch_all(dir: &Path, names: &[&str]) {
        for name in names {
            File::create(dir.join(name)).unwrap();
        }
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch_all(dir.path(), &["c.fit", "a.FITS", "b.fits", "notes.txt", "d.png"]);
        fs::create_dir(dir.path().join("sub.fit")).unwrap();

        let list = FrameList::scan(dir.path(), SortOrder::Name).unwrap();
        let names: Vec<_> = list
            .entries()
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.FITS", "b.fits", "c.fit"]);
    }

    #[test]
    fn test_navigation_clamps_and_skips_broken() {
        let dir = tempfile::tempdir().unwrap();
        touch_all(dir.path(), &["1.fit", "2.fit", "3.fit", "4.fit"]);
        let mut list = FrameList::scan(dir.path(), SortOrder::Name).unwrap();

        assert!(list.select(Navigate::Last).unwrap().ends_with("4.fit"));
        assert!(list.select(Navigate::Next).is_none());
        assert!(list.select(Navigate::Index(99)).is_none());
        assert_eq!(list.position_prefix().as_deref(), Some("(4/4) "));

        list.mark_broken(&dir.path().join("3.fit"));
        assert!(list.select(Navigate::Previous).unwrap().ends_with("2.fit"));
        assert!(list.select(Navigate::Next).unwrap().ends_with("4.fit"));
        assert!(list.select(Navigate::First).unwrap().ends_with("1.fit"));
        assert!(list.select(Navigate::Previous).is_none());
        assert!(list.select(Navigate::Redraw).unwrap().ends_with("1.fit"));
    }

    #[test]
    fn test_reload_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        touch_all(dir.path(), &["1.fit", "2.fit"]);
        let mut list = FrameList::scan(dir.path(), SortOrder::Name).unwrap();
        list.mark_broken(&dir.path().join("2.fit"));
        assert!(!list.reload().unwrap());

        touch_all(dir.path(), &["3.fit"]);
        assert!(list.reload().unwrap());
        assert_eq!(list.len(), 3);
        assert!(list.entries()[1].broken);
        assert_eq!(list.current_index(), None);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = FrameList::scan(dir.path(), SortOrder::Modified).unwrap();
        assert!(list.is_empty());
        assert!(list.select(Navigate::Last).is_none());
    }
}
