//! Process host adapter.
//!
//! The controller asks the host for two things: keep-alive priority while a
//! loop is running, and a registration for boot notifications. The host is
//! responsible for calling [`crate::LifecycleController::reconcile`] when
//! those notifications arrive.

use crate::error::Result;
use tracing::{debug, info};

/// Host-side primitives the controller depends on.
pub trait ProcessHost: Send + Sync + 'static {
    /// Ask to be notified (via `reconcile`) after every host boot.
    fn register_boot_hook(&self) -> Result<()>;

    /// Raise the process to keep-alive priority, showing `status` where the
    /// host surfaces one.
    fn enter_keep_alive(&self, status: &str) -> Result<()>;

    /// Drop keep-alive priority. No-op when not held.
    fn exit_keep_alive(&self);
}

/// Status text shown while a loop is running.
#[must_use]
pub fn keep_alive_status(interval_secs: i64) -> String {
    format!("Logging active (interval: {interval_secs}s)")
}

/// Host with no keep-alive or boot facilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessHost;

impl ProcessHost for NoopProcessHost {
    fn register_boot_hook(&self) -> Result<()> {
        Ok(())
    }

    fn enter_keep_alive(&self, _status: &str) -> Result<()> {
        Ok(())
    }

    fn exit_keep_alive(&self) {}
}

/// Host that only records the requests in the diagnostics log.
///
/// Used by `heartlog-host`. The process stays up after its command input
/// closes, so a service manager can start it at boot and restart it on death
/// without holding stdin open.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProcessHost;

impl ProcessHost for TracingProcessHost {
    fn register_boot_hook(&self) -> Result<()> {
        debug!("boot notifications are delivered by the supervisor via host.boot");
        Ok(())
    }

    fn enter_keep_alive(&self, status: &str) -> Result<()> {
        info!(status, "keep-alive requested");
        Ok(())
    }

    fn exit_keep_alive(&self) {
        info!("keep-alive released");
    }
}
