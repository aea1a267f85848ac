//! Saved viewer sessions.
//!
//! Sessions are JSON files with the `.fih` extension kept under
//! `~/.config/fit-image-helper/` by default. A session can also be loaded
//! from any other path.

use std::fs;
use std::path::{Path, PathBuf};

use fih_shared::{CameraSettings, DisplayParameters};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::navigation::SortOrder;

/// Extension of session files.
pub const SESSION_EXTENSION: &str = "fih";

/// What the viewer was looking at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Target {
    #[default]
    Empty,
    Single {
        path: PathBuf,
    },
    Multi {
        path: PathBuf,
        #[serde(default)]
        order: SortOrder,
    },
    Camera {
        id: String,
    },
}

/// Everything needed to restore a viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavedSession {
    pub display: DisplayParameters,
    pub camera: CameraSettings,
    pub target: Target,
    /// Directory that live frames are written to, when saving is on
    pub capture_dir: Option<PathBuf>,
}

impl SavedSession {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Take over `other`'s settings. The target is only replaced when this
    /// session has none yet.
    pub fn merge(&mut self, other: SavedSession) {
        self.display = other.display;
        self.camera = other.camera;
        self.capture_dir = other.capture_dir;
        if self.target == Target::Empty {
            self.target = other.target;
        }
    }
}

/// Session store rooted at a configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Storage at `$HOME/.config/fit-image-helper`.
    pub fn new() -> Result<Self, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::NoHome)?;
        Ok(Self {
            root_path: PathBuf::from(home).join(".config").join("fit-image-helper"),
        })
    }

    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn session_path(&self, name: &str) -> PathBuf {
        let name = name.strip_suffix(".fih").unwrap_or(name);
        self.root_path.join(format!("{name}.{SESSION_EXTENSION}"))
    }

    /// Load the named session.
    ///
    /// Returns None if it does not exist.
    pub fn get_session(&self, name: &str) -> Option<Result<SavedSession, ConfigError>> {
        let path = self.session_path(name);
        if !path.exists() {
            return None;
        }
        Some(SavedSession::load_from_file(&path))
    }

    /// Save `session` under `name`, creating the directory as needed.
    pub fn save_session(&self, name: &str, session: &SavedSession) -> Result<PathBuf, ConfigError> {
        fs::create_dir_all(&self.root_path)?;
        let path = self.session_path(name);
        session.save_to_file(&path)?;
        log::info!("saved session to {}", path.display());
        Ok(path)
    }

    /// Names of the stored sessions, sorted.
    pub fn list_sessions(&self) -> Result<Vec<String>, ConfigError> {
        if !self.root_path.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root_path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some(SESSION_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns Ok(true) if the session was deleted, Ok(false) if it didn't exist.
    pub fn delete_session(&self, name: &str) -> Result<bool, ConfigError> {
        let path = self.session_path(name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}
