//! Headless heartlog host.
//!
//! Loads configuration, opens the persisted logging state, resumes the
//! emission loop when the state says it should be running, and serves the
//! newline-delimited JSON command bridge on stdin/stdout.
//!
//! Closing stdin does not stop logging unless `host.exit_on_eof` is set; the
//! process otherwise runs until `runtime.stop`, SIGTERM or Ctrl-C.
//!
//! All tracing/diagnostic output goes to stderr (and optionally a daily
//! rolling file) so that stdout remains a clean JSON protocol channel.

use anyhow::Context;
use heartlog::config::{DiagnosticsConfig, HeartlogConfig};
use heartlog::controller::LifecycleController;
use heartlog::heartlog_dirs;
use heartlog::host::service::{HostOptions, run_host};
use heartlog::process::TracingProcessHost;
use heartlog::sink::create_sink;
use heartlog::state::JsonStateStore;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = HeartlogConfig::default_config_path();
    let config = HeartlogConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let _diagnostics_guard = init_tracing(&config.diagnostics);
    tracing::info!(config = %config_path.display(), "heartlog-host starting");

    let state_path = config.state.path();
    let store = JsonStateStore::open(&state_path, config.logging.default_interval_secs)
        .with_context(|| format!("failed to open state at {}", state_path.display()))?;
    let sink = create_sink(&config.sink);
    tracing::info!(
        state = %state_path.display(),
        sink = sink.name(),
        "state and sink ready"
    );

    let controller = LifecycleController::new(Arc::new(store), sink, Arc::new(TracingProcessHost))
        .context("failed to build lifecycle controller")?
        .with_start_policy(config.logging.start_policy())
        .with_clear_resets_counter(config.logging.clear_resets_counter);
    let controller = Arc::new(controller);

    let exit = run_host(
        controller,
        HostOptions::from_config(&config),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "heartlog-host exited with error");
        anyhow::anyhow!("heartlog-host failed: {e}")
    })?;

    tracing::info!(?exit, "heartlog-host shut down cleanly");
    Ok(())
}

/// Install stderr output and, when configured, a daily rolling file under
/// the logs directory. `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &DiagnosticsConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let mut file_error = None;
    let (file_layer, guard) = if config.log_to_file {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("heartlog-host")
            .filename_suffix("log")
            .build(heartlog_dirs::logs_dir())
        {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (
                    Some(fmt::layer().with_writer(writer).with_ansi(false)),
                    Some(guard),
                )
            }
            Err(e) => {
                file_error = Some(e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("diagnostics file disabled: {e}");
    }
    guard
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("unable to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
