//! Persisted logging control state.
//!
//! The state is a single record of three scalars (`active`, `interval_secs`,
//! `counter`). Every mutation goes through [`StateStore::update`], which
//! applies a read-modify-write under the store's lock so controller writes
//! and emission-loop increments can not interleave into a lost update.

pub mod file;
pub mod memory;

pub use file::JsonStateStore;
pub use memory::MemoryStateStore;

use crate::config::DEFAULT_INTERVAL_SECS;
use crate::error::{HeartlogError, Result};
use serde::{Deserialize, Serialize};

/// The sole persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingState {
    /// Desired run state; survives process death and reboot.
    #[serde(rename = "logging_active", default)]
    pub active: bool,
    /// Seconds between ticks. Retained for redisplay while stopped.
    #[serde(rename = "logging_interval", default = "default_interval")]
    pub interval_secs: i64,
    /// Value of the last emitted entry.
    #[serde(rename = "log_counter", default)]
    pub counter: i64,
}

fn default_interval() -> i64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for LoggingState {
    fn default() -> Self {
        Self::with_interval(DEFAULT_INTERVAL_SECS)
    }
}

impl LoggingState {
    /// Fresh inactive state with the given interval.
    #[must_use]
    pub fn with_interval(interval_secs: i64) -> Self {
        Self {
            active: false,
            interval_secs,
            counter: 0,
        }
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.counter < 0 {
            return Err(HeartlogError::InvalidArgument(format!(
                "counter must be >= 0, got {}",
                self.counter
            )));
        }
        if self.active && self.interval_secs <= 0 {
            return Err(HeartlogError::InvalidArgument(format!(
                "interval must be > 0 while active, got {}",
                self.interval_secs
            )));
        }
        Ok(())
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub active: Option<bool>,
    pub interval_secs: Option<i64>,
    pub counter: Option<i64>,
}

impl StatePatch {
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    #[must_use]
    pub fn interval_secs(mut self, interval_secs: i64) -> Self {
        self.interval_secs = Some(interval_secs);
        self
    }

    #[must_use]
    pub fn counter(mut self, counter: i64) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Apply to `state`. Returns `true` when any field changed.
    pub fn apply_to(&self, state: &mut LoggingState) -> bool {
        let before = *state;
        if let Some(active) = self.active {
            state.active = active;
        }
        if let Some(interval_secs) = self.interval_secs {
            state.interval_secs = interval_secs;
        }
        if let Some(counter) = self.counter {
            state.counter = counter;
        }
        *state != before
    }
}

/// Durable key-value persistence for [`LoggingState`].
///
/// Implementations must make a successful write survive immediate process
/// termination, and must serialize `update` calls against each other.
pub trait StateStore: Send + Sync + 'static {
    /// Current state.
    fn get(&self) -> Result<LoggingState>;

    /// Atomic read-modify-write.
    ///
    /// `apply` mutates a copy of the current state and returns whether it
    /// should be written. When it returns `false` nothing is persisted and the
    /// current state is returned. A failed write leaves the stored state
    /// unchanged and returns [`HeartlogError::Persistence`].
    fn update(&self, apply: &mut dyn FnMut(&mut LoggingState) -> bool) -> Result<LoggingState>;

    /// Apply a partial update atomically.
    fn set(&self, patch: StatePatch) -> Result<LoggingState> {
        self.update(&mut |state| patch.apply_to(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped_ten_seconds_zero_counter() {
        let state = LoggingState::default();
        assert!(!state.active);
        assert_eq!(state.interval_secs, 10);
        assert_eq!(state.counter, 0);
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut state = LoggingState {
            active: true,
            interval_secs: 5,
            counter: 7,
        };
        let changed = StatePatch::default().active(false).apply_to(&mut state);
        assert!(changed);
        assert_eq!(state.interval_secs, 5);
        assert_eq!(state.counter, 7);
        assert!(!state.active);
    }

    #[test]
    fn empty_patch_reports_no_change() {
        let mut state = LoggingState::default();
        assert!(!StatePatch::default().apply_to(&mut state));
        assert!(!StatePatch::default().counter(0).apply_to(&mut state));
    }

    #[test]
    fn validate_rejects_active_without_interval() {
        let state = LoggingState {
            active: true,
            interval_secs: 0,
            counter: 0,
        };
        assert!(state.validate().is_err());

        let inactive = LoggingState {
            active: false,
            interval_secs: 0,
            counter: 0,
        };
        assert!(inactive.validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_counter() {
        let state = LoggingState {
            counter: -1,
            ..LoggingState::default()
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn serialized_keys_match_persisted_layout() {
        let json = serde_json::to_value(LoggingState {
            active: true,
            interval_secs: 5,
            counter: 3,
        })
        .expect("serialize");
        assert_eq!(json["logging_active"], true);
        assert_eq!(json["logging_interval"], 5);
        assert_eq!(json["log_counter"], 3);
    }
}
