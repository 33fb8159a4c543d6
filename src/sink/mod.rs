//! Append-only log sinks.
//!
//! The emission loop hands each formatted line to a [`LogSink`]. Concrete
//! adapters are picked once at construction time by [`create_sink`]; nothing
//! downstream branches on which one is in use.

mod file;
mod memory;
mod trace;

pub use file::FileSink;
pub use memory::MemorySink;
pub use trace::TracingSink;

use crate::config::{SinkConfig, SinkKind};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;

/// Message body written on every tick.
pub const TICK_MESSAGE: &str = "application running normally";

/// Errors reported by sink adapters.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("cannot append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot clear {path}: {source}")]
    Clear {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Append-only destination for formatted log lines.
///
/// Callers guarantee at most one in-flight `append`; adapters do not need
/// their own ordering guarantees beyond that.
pub trait LogSink: Send + Sync + 'static {
    /// Append one line (including its trailing newline).
    fn append(&self, line: &str) -> Result<(), SinkError>;

    /// Remove all existing content. Later appends must still succeed.
    fn clear(&self) -> Result<(), SinkError>;

    /// Short adapter name for diagnostics.
    fn name(&self) -> &'static str;
}

/// One timestamped log line, not retained after formatting.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    /// Entry stamped with the current local time.
    #[must_use]
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }

    /// The periodic entry for counter value `counter`.
    #[must_use]
    pub fn tick(counter: i64) -> Self {
        Self::now(format!("Log entry #{counter}: {TICK_MESSAGE}"))
    }

    /// `[YYYY-MM-DD HH:MM:SS] <message>\n`
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "[{}] {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Build the adapter named by `config`.
#[must_use]
pub fn create_sink(config: &SinkConfig) -> Arc<dyn LogSink> {
    match config.kind {
        SinkKind::File => Arc::new(FileSink::new(config.file_path())),
        SinkKind::Memory => Arc::new(MemorySink::new()),
        SinkKind::Tracing => Arc::new(TracingSink),
    }
}
