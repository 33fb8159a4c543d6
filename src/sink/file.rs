use super::{LogSink, SinkError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends to a single file, creating it (and its directory) on demand.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Append {
            path: self.path.clone(),
            source,
        }
    }
}

impl LogSink for FileSink {
    fn append(&self, line: &str) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.append_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.append_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.append_error(e))?;
        file.flush().map_err(|e| self.append_error(e))
    }

    fn clear(&self) -> Result<(), SinkError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SinkError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn appends_never_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FileSink::new(dir.path().join("nested").join("logfile.txt"));
        sink.append("one\n").expect("append");
        sink.append("two\n").expect("append");
        let content = std::fs::read_to_string(sink.path()).expect("read");
        assert_eq!(content, "one\ntwo\n");
    }

    #[test]
    fn clear_then_append_recreates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FileSink::new(dir.path().join("logfile.txt"));
        sink.append("old\n").expect("append");
        sink.clear().expect("clear");
        assert!(!sink.path().exists());

        sink.append("new\n").expect("append after clear");
        assert_eq!(std::fs::read_to_string(sink.path()).unwrap(), "new\n");
    }

    #[test]
    fn clear_missing_file_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FileSink::new(dir.path().join("never-written.txt"));
        assert!(sink.clear().is_ok());
    }

    #[test]
    fn append_into_file_path_parent_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").expect("write");
        let sink = FileSink::new(blocker.join("logfile.txt"));
        let err = sink.append("line\n").expect_err("parent is a file");
        assert!(matches!(err, SinkError::Append { .. }));
    }
}
