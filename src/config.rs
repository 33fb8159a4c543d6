//! Configuration types for the telemetry emitter.

use crate::controller::StartPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default interval used when no state has ever been persisted.
pub const DEFAULT_INTERVAL_SECS: i64 = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartlogConfig {
    /// Emission loop and controller behaviour.
    pub logging: LoggingConfig,
    /// State store location.
    pub state: StateConfig,
    /// Log sink selection.
    pub sink: SinkConfig,
    /// Diagnostic tracing output of the host process itself.
    pub diagnostics: DiagnosticsConfig,
    /// Host process behaviour.
    pub host: HostConfig,
}

/// Controller behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Interval applied to a freshly created state record.
    pub default_interval_secs: i64,
    /// Whether an explicit start resets the counter to 0.
    ///
    /// Reconciliation never resets the counter regardless of this flag.
    pub start_resets_counter: bool,
    /// Whether `clear` also resets the persisted counter to 0.
    pub clear_resets_counter: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            start_resets_counter: true,
            clear_resets_counter: false,
        }
    }
}

impl LoggingConfig {
    /// Start policy derived from [`Self::start_resets_counter`].
    #[must_use]
    pub fn start_policy(&self) -> StartPolicy {
        if self.start_resets_counter {
            StartPolicy::ResetCounter
        } else {
            StartPolicy::PreserveCounter
        }
    }
}

/// Where the logging state document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Namespace; the document is stored as `<namespace>.json`.
    pub namespace: String,
    /// Directory override (None = [`crate::heartlog_dirs::config_dir`]).
    pub dir: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            namespace: "logging_prefs".to_owned(),
            dir: None,
        }
    }
}

impl StateConfig {
    /// Resolved state document path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.join(format!("{}.json", self.namespace)),
            None => crate::heartlog_dirs::state_file(&self.namespace),
        }
    }
}

/// Log sink adapter kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Append to a file on disk.
    #[default]
    File,
    /// Keep lines in process memory.
    Memory,
    /// Forward lines as tracing events.
    Tracing,
}

/// Log sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Which adapter to construct.
    pub kind: SinkKind,
    /// File name used by the file adapter.
    pub file_name: String,
    /// Directory override for the file adapter (None = [`crate::heartlog_dirs::sink_dir`]).
    pub dir: Option<PathBuf>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::File,
            file_name: "logfile.txt".to_owned(),
            dir: None,
        }
    }
}

impl SinkConfig {
    /// Resolved path for the file adapter.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::heartlog_dirs::sink_dir)
            .join(&self.file_name)
    }
}

/// Diagnostics output of the host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Default `EnvFilter` directive (`RUST_LOG` takes precedence).
    pub filter: String,
    /// Also write a daily rolling diagnostics file under the logs directory.
    pub log_to_file: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            log_to_file: false,
        }
    }
}

/// Host process behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Exit when command input reaches EOF.
    ///
    /// When false the host keeps the emission loop running after stdin closes
    /// and exits only on `runtime.stop`, SIGTERM or Ctrl-C.
    pub exit_on_eof: bool,
}

impl HeartlogConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::HeartlogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only when an existing file is unreadable or invalid.
    pub fn load_or_default(path: &Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::HeartlogError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path, honouring `HEARTLOG_CONFIG`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(path) = std::env::var_os("HEARTLOG_CONFIG") {
            return PathBuf::from(path);
        }
        crate::heartlog_dirs::config_file()
    }

    /// Reject values the engine can not run with.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HeartlogError::Config`] describing the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.logging.default_interval_secs <= 0 {
            return Err(crate::error::HeartlogError::Config(format!(
                "logging.default_interval_secs must be > 0, got {}",
                self.logging.default_interval_secs
            )));
        }
        if self.state.namespace.trim().is_empty() {
            return Err(crate::error::HeartlogError::Config(
                "state.namespace cannot be empty".to_owned(),
            ));
        }
        if self.sink.kind == SinkKind::File && self.sink.file_name.trim().is_empty() {
            return Err(crate::error::HeartlogError::Config(
                "sink.file_name cannot be empty for the file sink".to_owned(),
            ));
        }
        Ok(())
    }
}
