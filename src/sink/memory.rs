use super::{LogSink, SinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Keeps appended lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    fail_appends: AtomicBool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line appended since the last clear.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make subsequent appends fail with [`SinkError::Unavailable`].
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: &str) -> Result<(), SinkError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable(
                "memory sink configured to fail appends".to_owned(),
            ));
        }
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), SinkError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_clears() {
        let sink = MemorySink::new();
        sink.append("a\n").expect("append");
        sink.append("b\n").expect("append");
        assert_eq!(sink.lines(), vec!["a\n".to_owned(), "b\n".to_owned()]);

        sink.clear().expect("clear");
        assert!(sink.lines().is_empty());
        sink.append("c\n").expect("append");
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn failing_appends_are_reported() {
        let sink = MemorySink::new();
        sink.set_fail_appends(true);
        assert!(matches!(
            sink.append("x\n"),
            Err(SinkError::Unavailable(_))
        ));
        assert!(sink.lines().is_empty());
    }
}
