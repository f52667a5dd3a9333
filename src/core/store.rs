//! Durable storage for session state.
//!
//! The session is persisted as one versioned TOML blob. Storage is behind
//! the [`SessionStore`] trait so the core stays testable without touching
//! the filesystem; [`FileSessionStore`] is the production implementation
//! and [`MemorySessionStore`] backs tests and embedders without a durable
//! medium.

use crate::core::session::{SessionState, SESSION_STATE_VERSION};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

const SESSION_FILE: &str = "session.toml";

/// Errors that can occur when loading or saving the persisted session.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the session file from disk.
    Read {
        /// Path to the session file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the session file as valid TOML.
    Parse {
        /// Path to the session file with invalid TOML.
        path: PathBuf,
        /// The TOML deserialization error.
        source: toml::de::Error,
    },

    /// Failed to serialize the session state.
    Serialize {
        /// The TOML serialization error.
        source: toml::ser::Error,
    },

    /// Failed to write the session file to disk.
    Write {
        /// Path to the session file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The persisted blob carries a version tag this build does not know.
    StaleVersion {
        /// Version tag found in the persisted blob.
        found: u32,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read session at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse session at {}: {}",
                    path.display(),
                    source
                )
            }
            StoreError::Serialize { source } => {
                write!(f, "Failed to serialize session: {source}")
            }
            StoreError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write session at {}: {}",
                    path.display(),
                    source
                )
            }
            StoreError::StaleVersion { found } => {
                write!(
                    f,
                    "Persisted session has version {found}, expected {SESSION_STATE_VERSION}"
                )
            }
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Read { source, .. } => Some(source),
            StoreError::Parse { source, .. } => Some(source),
            StoreError::Serialize { source } => Some(source),
            StoreError::Write { source, .. } => Some(source),
            StoreError::StaleVersion { .. } => None,
        }
    }
}

/// Durable key-value slot for the serialized session.
///
/// Access is synchronous: `save` must hit the medium before it returns so
/// the next `load` observes the write.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<SessionState, StoreError>;
    fn save(&self, state: &SessionState) -> Result<(), StoreError>;
}

/// Session storage backed by a TOML file in the platform config directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new() -> Self {
        Self { path: Self::default_path() }
    }

    /// Use an explicit file path instead of the platform config directory.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "chatgate")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join(SESSION_FILE)
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<SessionState, StoreError> {
        if !self.path.exists() {
            return Ok(SessionState::default());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let state: SessionState =
            toml::from_str(&contents).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if state.version != SESSION_STATE_VERSION {
            return Err(StoreError::StaleVersion { found: state.version });
        }
        Ok(state)
    }

    fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let contents =
            toml::to_string_pretty(state).map_err(|source| StoreError::Serialize { source })?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        temp_file
            .persist(&self.path)
            .map_err(|err| StoreError::Write {
                path: self.path.clone(),
                source: err.error,
            })?;
        Ok(())
    }
}

/// In-memory session storage. State does not survive the process.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<SessionState>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently saved state, if any. Used by tests to assert on
    /// persistence without reloading.
    pub fn saved(&self) -> Option<SessionState> {
        match self.slot.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<SessionState, StoreError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(state.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(state.clone()),
        }
        Ok(())
    }
}
