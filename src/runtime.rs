//! Lifecycle events broadcast by the controller for UI and observability.
//!
//! Events are small and cloneable; a lagging subscriber drops events rather
//! than slowing down the emission loop.

use crate::controller::ReconcileTrigger;
use serde::Serialize;

/// Where a tick failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStage {
    /// Counter write to the state store.
    Persist,
    /// Append to the log sink.
    Sink,
}

/// Events that describe what the controller and its loop are doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoggingEvent {
    /// Explicit start spawned a new loop.
    Started {
        generation: u64,
        interval_secs: i64,
        counter: i64,
    },
    /// Reconciliation spawned a loop continuing the persisted counter.
    Resumed {
        generation: u64,
        interval_secs: i64,
        counter: i64,
        trigger: ReconcileTrigger,
    },
    /// A loop was cancelled.
    Stopped {
        generation: u64,
        /// `false` when the persisted `active` flag was left untouched
        /// (teardown, reset, or superseded by a new start).
        desired: bool,
    },
    /// One entry was handed to the sink.
    Tick { generation: u64, counter: i64 },
    /// A tick hit a non-fatal error and the loop carried on.
    TickFailed {
        generation: u64,
        counter: i64,
        stage: TickStage,
        error: String,
    },
    /// Sink content was cleared.
    Cleared { counter_reset: bool },
}

impl LoggingEvent {
    /// Wire name used by the host bridge.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "logging.started",
            Self::Resumed { .. } => "logging.resumed",
            Self::Stopped { .. } => "logging.stopped",
            Self::Tick { .. } => "logging.tick",
            Self::TickFailed { .. } => "logging.tick_failed",
            Self::Cleared { .. } => "logging.cleared",
        }
    }
}
