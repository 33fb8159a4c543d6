use super::{LogSink, SinkError};

/// Forwards each line as a `tracing` event under the `heartlog::sink` target.
///
/// For hosts without writable storage. `clear` has nothing to remove.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, line: &str) -> Result<(), SinkError> {
        tracing::info!(target: "heartlog::sink", "{}", line.trim_end());
        Ok(())
    }

    fn clear(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
