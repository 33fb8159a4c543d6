//! Periodic emission loop.
//!
//! One [`EmissionLoop`] is one generation: it waits `interval`, increments and
//! persists the counter, appends one line to the sink, and repeats until its
//! cancellation token fires. Errors inside a tick are logged and broadcast,
//! never propagated; only cancellation ends the loop.

use crate::runtime::{LoggingEvent, TickStage};
use crate::sink::{LogEntry, LogSink};
use crate::state::StateStore;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serializes sink access between the loop and out-of-band controller writes.
pub type SinkGate = Arc<Mutex<()>>;

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Line appended with this counter value.
    Emitted(i64),
    /// Something failed; the loop continues with this best-known counter.
    Degraded(i64),
    /// Cancellation was observed before any write.
    Cancelled,
}

/// A single generation of the periodic task.
pub struct EmissionLoop {
    generation: u64,
    interval: Duration,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn LogSink>,
    sink_gate: SinkGate,
    cancel: CancellationToken,
    events: broadcast::Sender<LoggingEvent>,
    /// Counter handed to the sink whose write to the store failed.
    unpersisted: Option<i64>,
}

impl EmissionLoop {
    #[must_use]
    pub fn new(
        generation: u64,
        interval: Duration,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn LogSink>,
        sink_gate: SinkGate,
        cancel: CancellationToken,
        events: broadcast::Sender<LoggingEvent>,
    ) -> Self {
        Self {
            generation,
            interval,
            store,
            sink,
            sink_gate,
            cancel,
            events,
            unpersisted: None,
        }
    }

    /// Run until cancelled. Waits one full interval before the first tick.
    ///
    /// Each tick runs on the blocking pool: the store and the sink may fsync.
    pub async fn run(self) {
        let generation = self.generation;
        info!(
            generation,
            interval_secs = self.interval.as_secs(),
            "emission loop started"
        );

        let mut emission = self;
        loop {
            if emission.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                () = emission.cancel.cancelled() => break,
                () = tokio::time::sleep(emission.interval) => {}
            }

            let ticked = tokio::task::spawn_blocking(move || {
                let outcome = emission.tick();
                (emission, outcome)
            })
            .await;

            match ticked {
                Ok((_, TickOutcome::Cancelled)) => break,
                Ok((returned, _)) => emission = returned,
                Err(e) => {
                    warn!(generation, "tick task failed, loop ends: {e}");
                    break;
                }
            }
        }

        info!(generation, "emission loop stopped");
    }

    /// Execute one tick.
    ///
    /// The cancellation check and the counter write happen under the store's
    /// lock, so once a controller has cancelled this generation and then
    /// written new state, this generation can not write anymore.
    ///
    /// After a failed counter write the next tick continues from the value
    /// already emitted, so entries never repeat while the store is failing.
    pub fn tick(&mut self) -> TickOutcome {
        let cancel = &self.cancel;
        let floor = self.unpersisted;
        let mut next: Option<i64> = None;

        let persisted = self.store.update(&mut |state| {
            if cancel.is_cancelled() {
                return false;
            }
            let base = floor.map_or(state.counter, |f| state.counter.max(f));
            let value = base.saturating_add(1);
            next = Some(value);
            state.counter = value;
            true
        });

        let mut degraded = false;
        let counter = match (persisted, next) {
            (Ok(_), Some(value)) => {
                self.unpersisted = None;
                value
            }
            (Ok(_), None) => {
                debug!(generation = self.generation, "tick skipped after cancellation");
                return TickOutcome::Cancelled;
            }
            (Err(e), value) => {
                let value = value.unwrap_or_else(|| floor.unwrap_or(0).saturating_add(1));
                warn!(
                    generation = self.generation,
                    counter = value,
                    "counter write failed, emitting best-known value: {e}"
                );
                self.publish(LoggingEvent::TickFailed {
                    generation: self.generation,
                    counter: value,
                    stage: TickStage::Persist,
                    error: e.to_string(),
                });
                self.unpersisted = Some(value);
                degraded = true;
                value
            }
        };

        let line = LogEntry::tick(counter).format_line();
        let appended = {
            let _gate = self.sink_gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.sink.append(&line)
        };

        match appended {
            Ok(()) => {
                debug!(generation = self.generation, counter, "log entry appended");
                self.publish(LoggingEvent::Tick {
                    generation: self.generation,
                    counter,
                });
            }
            Err(e) => {
                warn!(
                    generation = self.generation,
                    counter,
                    sink = self.sink.name(),
                    "log sink append failed: {e}"
                );
                self.publish(LoggingEvent::TickFailed {
                    generation: self.generation,
                    counter,
                    stage: TickStage::Sink,
                    error: e.to_string(),
                });
                degraded = true;
            }
        }

        if degraded {
            TickOutcome::Degraded(counter)
        } else {
            TickOutcome::Emitted(counter)
        }
    }

    fn publish(&self, event: LoggingEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
