//! Heartlog: a durable periodic heartbeat logger.
//!
//! A [`LifecycleController`] keeps one emission loop running whenever the
//! persisted desired state says logging is active. Each tick increments a
//! persisted counter and appends a timestamped line to a log sink:
//!
//! ```text
//! [2025-01-31 14:03:07] Log entry #42: application running normally
//! ```
//!
//! # Architecture
//!
//! - **State store** ([`state`]): atomic read-modify-write of the
//!   `active`/`interval`/`counter` record, durable across process death
//! - **Log sink** ([`sink`]): append-only line output (file, memory, tracing)
//! - **Controller** ([`controller`]): `start`/`stop`/`reconcile`/`reset`/`clear`
//! - **Emission loop** ([`emitter`]): one cancellable tokio task per generation
//! - **Host bridge** ([`host`]): versioned JSON commands over stdin/stdout

pub mod config;
pub mod controller;
pub mod emitter;
pub mod error;
pub mod heartlog_dirs;
pub mod host;
pub mod process;
pub mod runtime;
pub mod sink;
pub mod state;

pub use config::HeartlogConfig;
pub use controller::{
    LifecycleController, LoggingStatus, ReconcileOutcome, ReconcileTrigger, StartPolicy,
};
pub use error::{HeartlogError, Result};
pub use runtime::LoggingEvent;
pub use sink::{LogSink, SinkError};
pub use state::{LoggingState, StatePatch, StateStore};
