//! Host process lifecycle around the command bridge.
//!
//! Annotates the start, resumes persisted state, serves commands, and decides
//! when the process may go away. Closed command input is not a stop request:
//! unless `exit_on_eof` is set, the loop keeps running until `runtime.stop`
//! or the shutdown future fires.

use crate::config::HeartlogConfig;
use crate::controller::{LifecycleController, ReconcileTrigger};
use crate::error::Result;
use crate::host::handler::ControllerCommandHandler;
use crate::host::stdio::{BridgeExit, run_bridge};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{info, warn};

/// Settings the host service reads from [`HeartlogConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOptions {
    pub default_interval_secs: i64,
    pub exit_on_eof: bool,
}

impl HostOptions {
    #[must_use]
    pub fn from_config(config: &HeartlogConfig) -> Self {
        Self {
            default_interval_secs: config.logging.default_interval_secs,
            exit_on_eof: config.host.exit_on_eof,
        }
    }
}

/// How the host service ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// `runtime.stop` was acknowledged.
    StopRequested,
    /// Command input closed with `exit_on_eof` set.
    InputClosed,
    /// The shutdown future completed.
    Signalled,
}

/// Run the host until it is told to exit, then tear the loop down.
///
/// Teardown cancels the running loop and leaves the persisted desired state
/// alone, so the next process start resumes it.
pub async fn run_host<R, W, S>(
    controller: Arc<LifecycleController>,
    options: HostOptions,
    input: R,
    output: W,
    shutdown: S,
) -> Result<HostExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let result = serve(&controller, options, input, output, shutdown).await;
    controller.shutdown();
    result
}

async fn serve<R, W, S>(
    controller: &Arc<LifecycleController>,
    options: HostOptions,
    input: R,
    output: W,
    shutdown: S,
) -> Result<HostExit>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    if let Err(e) = controller.note("Host started") {
        warn!("startup annotation not written: {e}");
    }
    let outcome = controller.reconcile(ReconcileTrigger::ProcessStart)?;
    info!(?outcome, "process start reconciled");

    let handler =
        ControllerCommandHandler::new(Arc::clone(controller), options.default_interval_secs);
    let bridge = run_bridge(handler, controller.subscribe(), input, output);
    tokio::pin!(shutdown);

    let exit = tokio::select! {
        exit = bridge => exit?,
        () = &mut shutdown => {
            info!("shutdown signal received");
            return Ok(HostExit::Signalled);
        }
    };

    match exit {
        BridgeExit::StopRequested => Ok(HostExit::StopRequested),
        BridgeExit::InputClosed if options.exit_on_eof => {
            info!("command input closed; exiting");
            Ok(HostExit::InputClosed)
        }
        BridgeExit::InputClosed => {
            info!(
                running = controller.is_running(),
                "command input closed; logging continues until a shutdown signal"
            );
            shutdown.await;
            info!("shutdown signal received");
            Ok(HostExit::Signalled)
        }
    }
}
