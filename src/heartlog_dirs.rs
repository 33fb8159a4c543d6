//! Centralized directory paths for heartlog.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (log sink, diagnostics) | `~/Library/Application Support/heartlog/` | `~/.local/share/heartlog/` |
//! | Config (config.toml, state) | `~/Library/Application Support/heartlog/` | `~/.config/heartlog/` |
//!
//! # Environment Overrides
//!
//! - `HEARTLOG_DATA_DIR`: overrides [`data_dir`]
//! - `HEARTLOG_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the default file sink target and the diagnostics logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HEARTLOG_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("heartlog"))
        .unwrap_or_else(|| PathBuf::from("/tmp/heartlog-data"))
}

/// Application config directory.
///
/// Holds `config.toml` and the persisted logging state documents.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HEARTLOG_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("heartlog"))
        .unwrap_or_else(|| PathBuf::from("/tmp/heartlog-config"))
}

/// Diagnostics log directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default directory for the file sink (`data_dir()/downloads/`).
#[must_use]
pub fn sink_dir() -> PathBuf {
    data_dir().join("downloads")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted state document for a namespace (`config_dir()/<namespace>.json`).
#[must_use]
pub fn state_file(namespace: &str) -> PathBuf {
    config_dir().join(format!("{namespace}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_file_is_namespaced_json() {
        let path = state_file("logging_prefs");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("logging_prefs.json")
        );
        assert!(path.starts_with(config_dir()));
    }

    #[test]
    fn logs_and_sink_live_under_data_dir() {
        assert!(logs_dir().starts_with(data_dir()));
        assert!(sink_dir().starts_with(data_dir()));
        assert_ne!(logs_dir(), sink_dir());
    }

    #[test]
    fn config_file_is_toml() {
        assert_eq!(
            config_file().extension().and_then(|e| e.to_str()),
            Some("toml")
        );
    }
}
