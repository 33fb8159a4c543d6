//! Host command channel and router for supervising processes.

use crate::controller::{LoggingStatus, ReconcileOutcome};
use crate::error::{HeartlogError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::state::LoggingState;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Operations the router dispatches logging commands to.
pub trait LoggingCommandHandler: Send + Sync + 'static {
    fn request_start(&self, interval_secs: Option<i64>) -> Result<LoggingState>;
    fn request_stop(&self) -> Result<LoggingState>;
    fn request_reset(&self) -> Result<ReconcileOutcome>;
    fn request_clear(&self) -> Result<()>;
    fn query_status(&self) -> Result<LoggingStatus>;
    /// Host finished booting.
    fn notify_boot(&self) -> Result<ReconcileOutcome>;
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            HeartlogError::InvalidArgument(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                HeartlogError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| HeartlogError::Channel(format!("host command response dropped: {e}")))?
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender for publishing events alongside command acknowledgements.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }
}

pub struct HostCommandServer<H: LoggingCommandHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: LoggingCommandHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler,
        },
    )
}

impl<H: LoggingCommandHandler> HostCommandServer<H> {
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope);
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the appropriate handler.
    ///
    /// Handler errors become error responses so the caller always gets an
    /// answer for its request id.
    pub fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let routed = match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": crate::host::contract::EVENT_VERSION,
                    "package_version": env!("CARGO_PKG_VERSION"),
                    "channel": "heartlog_host_v1"
                }),
            )),
            CommandName::HostBoot => self.handle_host_boot(envelope),
            CommandName::LoggingStart => self.handle_logging_start(envelope),
            CommandName::LoggingStop => self.handle_logging_stop(envelope),
            CommandName::LoggingReset => self.handle_logging_reset(envelope),
            CommandName::LoggingClear => self.handle_logging_clear(envelope),
            CommandName::LoggingStatus => self.handle_logging_status(envelope),
            CommandName::RuntimeStop => self.handle_runtime_stop(envelope),
        };

        Ok(routed.unwrap_or_else(|e| {
            tracing::warn!(
                command = envelope.command.as_str(),
                request_id = %envelope.request_id,
                "host command failed: {e}"
            );
            ResponseEnvelope::error(envelope.request_id.clone(), e.to_string())
        }))
    }

    fn handle_host_boot(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let outcome = self.handler.notify_boot()?;
        let payload = outcome_payload(&outcome);

        self.emit_event(
            "host.boot_handled",
            serde_json::json!({
                "request_id": envelope.request_id,
                "outcome": payload
            }),
        );

        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    fn handle_logging_start(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let interval_secs = parse_interval_secs(&envelope.payload)?;
        let state = self.handler.request_start(interval_secs)?;

        self.emit_event(
            "logging.start_requested",
            serde_json::json!({
                "request_id": envelope.request_id,
                "interval_secs": state.interval_secs
            }),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            state_payload(&state),
        ))
    }

    fn handle_logging_stop(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let state = self.handler.request_stop()?;

        self.emit_event(
            "logging.stop_requested",
            serde_json::json!({"request_id": envelope.request_id}),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            state_payload(&state),
        ))
    }

    fn handle_logging_reset(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let outcome = self.handler.request_reset()?;

        self.emit_event(
            "logging.reset_requested",
            serde_json::json!({"request_id": envelope.request_id}),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            outcome_payload(&outcome),
        ))
    }

    fn handle_logging_clear(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.handler.request_clear()?;

        self.emit_event(
            "logging.clear_requested",
            serde_json::json!({"request_id": envelope.request_id}),
        );

        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"cleared": true}),
        ))
    }

    fn handle_logging_status(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let status = self.handler.query_status()?;
        let payload = serde_json::to_value(status).map_err(|e| {
            HeartlogError::Channel(format!("failed to serialize logging status: {e}"))
        })?;
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), payload))
    }

    fn handle_runtime_stop(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        self.emit_event(
            "runtime.stopping",
            serde_json::json!({"request_id": envelope.request_id}),
        );
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"accepted": true}),
        ))
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.event_tx.send(envelope);
    }
}

/// `payload.interval_secs` is optional; when present it must be an integer.
fn parse_interval_secs(payload: &serde_json::Value) -> Result<Option<i64>> {
    match payload.get("interval_secs") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => raw.as_i64().map(Some).ok_or_else(|| {
            HeartlogError::InvalidArgument(format!(
                "logging.start requires integer payload.interval_secs, got {raw}"
            ))
        }),
    }
}

fn state_payload(state: &LoggingState) -> serde_json::Value {
    serde_json::json!({
        "active": state.active,
        "interval_secs": state.interval_secs,
        "counter": state.counter
    })
}

fn outcome_payload(outcome: &ReconcileOutcome) -> serde_json::Value {
    match outcome {
        ReconcileOutcome::Inactive => serde_json::json!({"outcome": "inactive"}),
        ReconcileOutcome::AlreadyRunning { generation } => {
            serde_json::json!({"outcome": "already_running", "generation": generation})
        }
        ReconcileOutcome::Resumed { generation, state } => serde_json::json!({
            "outcome": "resumed",
            "generation": generation,
            "interval_secs": state.interval_secs,
            "counter": state.counter
        }),
        ReconcileOutcome::Halted { generation } => {
            serde_json::json!({"outcome": "halted", "generation": generation})
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestHandler {
        starts: Mutex<Vec<Option<i64>>>,
    }

    impl LoggingCommandHandler for TestHandler {
        fn request_start(&self, interval_secs: Option<i64>) -> Result<LoggingState> {
            self.starts.lock().unwrap().push(interval_secs);
            let interval_secs = interval_secs.unwrap_or(10);
            if interval_secs <= 0 {
                return Err(HeartlogError::InvalidArgument("interval".to_owned()));
            }
            Ok(LoggingState {
                active: true,
                interval_secs,
                counter: 0,
            })
        }
        fn request_stop(&self) -> Result<LoggingState> {
            Ok(LoggingState::default())
        }
        fn request_reset(&self) -> Result<ReconcileOutcome> {
            Ok(ReconcileOutcome::Inactive)
        }
        fn request_clear(&self) -> Result<()> {
            Err(HeartlogError::Persistence("disk gone".to_owned()))
        }
        fn query_status(&self) -> Result<LoggingStatus> {
            Ok(LoggingStatus {
                active: false,
                interval_secs: 10,
                counter: 4,
                running: false,
                generation: None,
            })
        }
        fn notify_boot(&self) -> Result<ReconcileOutcome> {
            Ok(ReconcileOutcome::Resumed {
                generation: 7,
                state: LoggingState {
                    active: true,
                    interval_secs: 10,
                    counter: 4,
                },
            })
        }
    }

    fn make_server() -> HostCommandServer<TestHandler> {
        let (_client, server) = command_channel(8, 8, TestHandler::default());
        server
    }

    fn make_envelope(command: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("test-req-1", command, payload)
    }

    #[test]
    fn start_passes_interval_through() {
        let server = make_server();
        let envelope = make_envelope(
            CommandName::LoggingStart,
            serde_json::json!({"interval_secs": 3}),
        );
        let resp = server.route(&envelope).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["interval_secs"], 3);
        assert_eq!(resp.payload["active"], true);
        assert_eq!(*server.handler.starts.lock().unwrap(), vec![Some(3)]);
    }

    #[test]
    fn start_without_interval_uses_handler_default() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::LoggingStart, serde_json::Value::Null))
            .unwrap();
        assert!(resp.ok);
        assert_eq!(*server.handler.starts.lock().unwrap(), vec![None]);
    }

    #[test]
    fn start_rejects_non_integer_interval() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(
                CommandName::LoggingStart,
                serde_json::json!({"interval_secs": "ten"}),
            ))
            .unwrap();
        assert!(!resp.ok);
        assert!(resp.error.unwrap().contains("interval_secs"));
        assert!(server.handler.starts.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_errors_become_error_responses() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::LoggingClear, serde_json::json!({})))
            .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "test-req-1");
        assert!(resp.error.unwrap().contains("disk gone"));
    }

    #[test]
    fn status_serializes_snapshot() {
        let server = make_server();
        let resp = server
            .route(&make_envelope(CommandName::LoggingStatus, serde_json::json!({})))
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["counter"], 4);
        assert_eq!(resp.payload["running"], false);
        assert!(resp.payload["generation"].is_null());
    }

    #[test]
    fn boot_reports_handler_outcome() {
        let server = make_server();
        let mut events = server.event_tx.subscribe();
        let resp = server
            .route(&make_envelope(CommandName::HostBoot, serde_json::json!({})))
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["outcome"], "resumed");
        assert_eq!(resp.payload["generation"], 7);
        assert_eq!(resp.payload["counter"], 4);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event, "host.boot_handled");
        assert_eq!(event.payload["outcome"]["outcome"], "resumed");
    }
}
