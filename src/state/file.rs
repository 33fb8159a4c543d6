//! File-backed state store with atomic replace-on-write.

use super::{LoggingState, StateStore};
use crate::error::{HeartlogError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

fn default_state_version() -> u8 {
    1
}

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default = "default_state_version")]
    version: u8,
    #[serde(flatten)]
    state: LoggingState,
}

/// JSON document store.
///
/// The current state is cached in memory behind a mutex; every write goes to
/// `<path>.tmp`, is fsynced, then renamed over `<path>`. The in-memory copy is
/// only replaced after the rename succeeds.
pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<LoggingState>,
}

impl JsonStateStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing document yields `LoggingState::with_interval(default_interval_secs)`.
    /// A malformed document is logged and replaced by the same defaults on the
    /// next write.
    pub fn open(path: impl Into<PathBuf>, default_interval_secs: i64) -> Result<Self> {
        let path = path.into();
        let state = match read_state_file(&path)? {
            Some(state) => {
                debug!(
                    active = state.active,
                    interval_secs = state.interval_secs,
                    counter = state.counter,
                    "loaded logging state from {}",
                    path.display()
                );
                state
            }
            None => LoggingState::with_interval(default_interval_secs),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Location of the persisted document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn get(&self) -> Result<LoggingState> {
        Ok(*self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn update(&self, apply: &mut dyn FnMut(&mut LoggingState) -> bool) -> Result<LoggingState> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = *guard;
        if !apply(&mut next) {
            return Ok(*guard);
        }
        next.validate()?;
        write_state_file(&self.path, &next)?;
        *guard = next;
        Ok(next)
    }
}

fn read_state_file(path: &Path) -> Result<Option<LoggingState>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(HeartlogError::Persistence(format!(
                "cannot read logging state {}: {e}",
                path.display()
            )));
        }
    };

    match serde_json::from_slice::<StateDocument>(&bytes) {
        Ok(doc) if doc.state.validate().is_ok() => Ok(Some(doc.state)),
        Ok(doc) => {
            warn!(
                "ignoring logging state at {} with invalid values: {:?}",
                path.display(),
                doc.state
            );
            Ok(None)
        }
        Err(e) => {
            warn!(
                "ignoring malformed logging state at {}: {e}",
                path.display()
            );
            Ok(None)
        }
    }
}

fn write_state_file(path: &Path, state: &LoggingState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HeartlogError::Persistence(format!("cannot create state directory: {e}"))
        })?;
    }

    let doc = StateDocument {
        version: default_state_version(),
        state: *state,
    };
    let json = serde_json::to_vec_pretty(&doc)
        .map_err(|e| HeartlogError::Persistence(format!("cannot serialize state: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = File::create(&tmp_path)
        .map_err(|e| HeartlogError::Persistence(format!("cannot create state temp file: {e}")))?;
    file.write_all(&json)
        .map_err(|e| HeartlogError::Persistence(format!("cannot write state temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| HeartlogError::Persistence(format!("cannot sync state temp file: {e}")))?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .map_err(|e| HeartlogError::Persistence(format!("cannot finalize state file: {e}")))?;

    // Persist the rename itself; not every platform allows opening a directory.
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}
