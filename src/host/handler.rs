//! Production host command handler backed by a [`LifecycleController`].

use crate::controller::{LifecycleController, LoggingStatus, ReconcileOutcome, ReconcileTrigger};
use crate::error::Result;
use crate::host::channel::LoggingCommandHandler;
use crate::state::LoggingState;
use std::sync::Arc;
use tracing::{info, warn};

/// Dispatches host commands to the controller and annotates the sink with
/// the user actions that reached it.
pub struct ControllerCommandHandler {
    controller: Arc<LifecycleController>,
    default_interval_secs: i64,
}

impl ControllerCommandHandler {
    #[must_use]
    pub fn new(controller: Arc<LifecycleController>, default_interval_secs: i64) -> Self {
        Self {
            controller,
            default_interval_secs,
        }
    }

    fn annotate(&self, action: &str) {
        if let Err(e) = self.controller.note(&format!("User triggered: {action}")) {
            warn!(action, "annotation not written: {e}");
        }
    }
}

impl LoggingCommandHandler for ControllerCommandHandler {
    fn request_start(&self, interval_secs: Option<i64>) -> Result<LoggingState> {
        let interval_secs = interval_secs.unwrap_or(self.default_interval_secs);
        info!(interval_secs, "logging.start requested");
        let state = self.controller.start(interval_secs)?;
        self.annotate("Start logging");
        Ok(state)
    }

    fn request_stop(&self) -> Result<LoggingState> {
        info!("logging.stop requested");
        let state = self.controller.stop()?;
        self.annotate("Stop logging");
        Ok(state)
    }

    fn request_reset(&self) -> Result<ReconcileOutcome> {
        info!("logging.reset requested");
        self.annotate("App reset");
        self.controller.reset()
    }

    fn request_clear(&self) -> Result<()> {
        info!("logging.clear requested");
        self.controller.clear()?;
        self.annotate("Clear logs");
        Ok(())
    }

    fn query_status(&self) -> Result<LoggingStatus> {
        self.controller.current_status()
    }

    fn notify_boot(&self) -> Result<ReconcileOutcome> {
        info!("host.boot received");
        self.controller.reconcile(ReconcileTrigger::Boot)
    }
}
