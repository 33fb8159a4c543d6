//! Lifecycle controller.
//!
//! Owns zero or one running [`EmissionLoop`] and keeps it in line with the
//! persisted desired state. Every public operation takes the controller's
//! slot lock for its whole duration, so concurrent `start`/`stop`/`reconcile`
//! calls are applied one at a time. None of them await the loop: they
//! cancel and return.
//!
//! ```text
//!            start / reconcile(active)
//!  Stopped ─────────────────────────────▶ Running ──┐ tick
//!     ▲                                     │  ▲    │
//!     └──────────────── stop ───────────────┘  └────┘
//!                          start: replace loop (counter reset per policy)
//! ```

use crate::emitter::{EmissionLoop, SinkGate};
use crate::error::{HeartlogError, Result};
use crate::process::{ProcessHost, keep_alive_status};
use crate::runtime::LoggingEvent;
use crate::sink::{LogEntry, LogSink};
use crate::state::{LoggingState, StatePatch, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the lifecycle event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// What an explicit `start` does to the persisted counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Every explicit start begins again at 1.
    #[default]
    ResetCounter,
    /// Explicit start continues from the persisted counter, like reconcile.
    PreserveCounter,
}

/// Which lifecycle event asked for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileTrigger {
    /// Hosting process (re)started.
    ProcessStart,
    /// Host finished booting.
    Boot,
    /// Caller requested a reset.
    Reset,
    /// A failed start restoring the previous loop.
    Rollback,
    /// Direct call with no specific trigger.
    Manual,
}

/// Result of [`LifecycleController::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Desired state is inactive; nothing runs.
    Inactive,
    /// A loop for the desired state already runs.
    AlreadyRunning { generation: u64 },
    /// A loop was spawned continuing the persisted counter.
    Resumed { generation: u64, state: LoggingState },
    /// A stray loop was cancelled because desired state is inactive.
    Halted { generation: u64 },
}

/// Snapshot for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoggingStatus {
    pub active: bool,
    pub interval_secs: i64,
    pub counter: i64,
    /// Whether a loop is live in this process.
    pub running: bool,
    pub generation: Option<u64>,
}

struct RunningLoop {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Default)]
struct LoopSlot {
    running: Option<RunningLoop>,
    next_generation: u64,
}

impl LoopSlot {
    fn live_generation(&self) -> Option<u64> {
        self.running
            .as_ref()
            .filter(|running| running.is_live())
            .map(|running| running.generation)
    }
}

/// Reconciles persisted desired state with the running emission loop.
pub struct LifecycleController {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn LogSink>,
    host: Arc<dyn ProcessHost>,
    runtime: tokio::runtime::Handle,
    policy: StartPolicy,
    clear_resets_counter: bool,
    sink_gate: SinkGate,
    slot: Mutex<LoopSlot>,
    events: broadcast::Sender<LoggingEvent>,
}

impl LifecycleController {
    /// Build a controller bound to the current tokio runtime.
    ///
    /// Registers for boot notifications with `host`; a refusal is logged and
    /// does not fail construction.
    ///
    /// # Errors
    ///
    /// Returns [`HeartlogError::Runtime`] when called outside a tokio runtime.
    pub fn new(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn LogSink>,
        host: Arc<dyn ProcessHost>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HeartlogError::Runtime(format!("no tokio runtime: {e}")))?;
        Ok(Self::with_runtime(store, sink, host, runtime))
    }

    /// Build a controller that spawns loops on `runtime`.
    #[must_use]
    pub fn with_runtime(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn LogSink>,
        host: Arc<dyn ProcessHost>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        if let Err(e) = host.register_boot_hook() {
            warn!("boot hook registration refused: {e}");
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            sink,
            host,
            runtime,
            policy: StartPolicy::default(),
            clear_resets_counter: false,
            sink_gate: Arc::new(Mutex::new(())),
            slot: Mutex::new(LoopSlot::default()),
            events,
        }
    }

    /// Override what explicit `start` does to the counter.
    #[must_use]
    pub fn with_start_policy(mut self, policy: StartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Make `clear` also reset the persisted counter.
    #[must_use]
    pub fn with_clear_resets_counter(mut self, reset: bool) -> Self {
        self.clear_resets_counter = reset;
        self
    }

    /// Subscribe to lifecycle and tick events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LoggingEvent> {
        self.events.subscribe()
    }

    /// Persist `active=true` with `interval_secs` and run a fresh loop.
    ///
    /// Any running loop is cancelled first. Under [`StartPolicy::ResetCounter`]
    /// the counter is persisted as 0, so the first entry of the new loop is #1.
    ///
    /// # Errors
    ///
    /// [`HeartlogError::InvalidArgument`] for `interval_secs <= 0` (nothing is
    /// touched); [`HeartlogError::Persistence`] when the state write fails, in
    /// which case the previous desired state is reconciled back into place.
    pub fn start(&self, interval_secs: i64) -> Result<LoggingState> {
        let interval = interval_duration(interval_secs)?;
        let mut slot = self.lock_slot();

        let superseded = self.cancel_running(&mut slot, false);

        let mut patch = StatePatch::default()
            .active(true)
            .interval_secs(interval_secs);
        if self.policy == StartPolicy::ResetCounter {
            patch = patch.counter(0);
        }

        let state = match self.store.set(patch) {
            Ok(state) => state,
            Err(e) => {
                warn!(interval_secs, "start not persisted: {e}");
                if superseded.is_some()
                    && let Err(rollback) = self.reconcile_locked(&mut slot, ReconcileTrigger::Rollback)
                {
                    warn!("could not restore previous loop: {rollback}");
                }
                return Err(e);
            }
        };

        let generation = self.spawn_loop(&mut slot, interval, state.interval_secs);
        info!(
            generation,
            interval_secs,
            counter = state.counter,
            "logging started"
        );
        self.publish(LoggingEvent::Started {
            generation,
            interval_secs,
            counter: state.counter,
        });
        Ok(state)
    }

    /// Persist `active=false` and cancel the running loop, if any.
    ///
    /// Returns without waiting for the loop to finish.
    ///
    /// # Errors
    ///
    /// [`HeartlogError::Persistence`] when the state write fails; the loop is
    /// then left running because the desired state did not change.
    pub fn stop(&self) -> Result<LoggingState> {
        let mut slot = self.lock_slot();
        let state = self.store.set(StatePatch::default().active(false))?;
        if let Some(generation) = self.cancel_running(&mut slot, true) {
            info!(generation, "logging stopped");
        } else {
            debug!("stop requested with no running loop");
        }
        self.host.exit_keep_alive();
        Ok(state)
    }

    /// Bring the running loop in line with persisted state.
    ///
    /// Resumes without touching the counter when `active` is set and no loop
    /// runs. Calling it repeatedly never produces a second loop.
    ///
    /// # Errors
    ///
    /// Propagates state store read failures.
    pub fn reconcile(&self, trigger: ReconcileTrigger) -> Result<ReconcileOutcome> {
        let mut slot = self.lock_slot();
        self.reconcile_locked(&mut slot, trigger)
    }

    /// Tear the loop down as a process restart would, then reconcile.
    ///
    /// Persisted state is untouched, so an active state resumes with its
    /// counter and interval intact.
    ///
    /// # Errors
    ///
    /// Propagates state store read failures.
    pub fn reset(&self) -> Result<ReconcileOutcome> {
        let mut slot = self.lock_slot();
        if let Some(generation) = self.cancel_running(&mut slot, false) {
            info!(generation, "loop torn down for reset");
        }
        self.reconcile_locked(&mut slot, ReconcileTrigger::Reset)
    }

    /// Remove all sink content; optionally reset the persisted counter.
    ///
    /// # Errors
    ///
    /// Sink failures are surfaced as [`HeartlogError::Sink`]; the counter is
    /// then left untouched.
    pub fn clear(&self) -> Result<()> {
        {
            let _gate = self.sink_gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.sink.clear()?;
        }
        if self.clear_resets_counter {
            self.store.set(StatePatch::default().counter(0))?;
        }
        info!(
            sink = self.sink.name(),
            counter_reset = self.clear_resets_counter,
            "log sink cleared"
        );
        self.publish(LoggingEvent::Cleared {
            counter_reset: self.clear_resets_counter,
        });
        Ok(())
    }

    /// Append an out-of-band `[timestamp] message` line through the sink.
    ///
    /// # Errors
    ///
    /// Sink failures are surfaced as [`HeartlogError::Sink`].
    pub fn note(&self, message: &str) -> Result<()> {
        let line = LogEntry::now(message).format_line();
        let _gate = self.sink_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.sink.append(&line)?;
        Ok(())
    }

    /// Persisted state plus whether a loop is live.
    ///
    /// # Errors
    ///
    /// Propagates state store read failures.
    pub fn current_status(&self) -> Result<LoggingStatus> {
        let slot = self.lock_slot();
        let state = self.store.get()?;
        let generation = slot.live_generation();
        Ok(LoggingStatus {
            active: state.active,
            interval_secs: state.interval_secs,
            counter: state.counter,
            running: generation.is_some(),
            generation,
        })
    }

    /// Whether a loop is live in this process.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_slot().live_generation().is_some()
    }

    /// Cancel the loop for process teardown. Persisted `active` is kept so a
    /// later `reconcile` resumes.
    pub fn shutdown(&self) {
        let mut slot = self.lock_slot();
        if let Some(generation) = self.cancel_running(&mut slot, false) {
            info!(generation, "loop cancelled for shutdown");
            self.host.exit_keep_alive();
        }
    }

    fn reconcile_locked(
        &self,
        slot: &mut LoopSlot,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileOutcome> {
        let state = self.store.get()?;

        if !state.active {
            if let Some(generation) = self.cancel_running(slot, true) {
                warn!(generation, ?trigger, "halted loop for inactive state");
                self.host.exit_keep_alive();
                return Ok(ReconcileOutcome::Halted { generation });
            }
            debug!(?trigger, "reconcile: logging inactive");
            return Ok(ReconcileOutcome::Inactive);
        }

        if let Some(generation) = slot.live_generation() {
            debug!(?trigger, generation, "reconcile: loop already running");
            return Ok(ReconcileOutcome::AlreadyRunning { generation });
        }

        let interval = interval_duration(state.interval_secs)?;
        let generation = self.spawn_loop(slot, interval, state.interval_secs);
        info!(
            generation,
            ?trigger,
            interval_secs = state.interval_secs,
            counter = state.counter,
            "logging resumed"
        );
        self.publish(LoggingEvent::Resumed {
            generation,
            interval_secs: state.interval_secs,
            counter: state.counter,
            trigger,
        });
        Ok(ReconcileOutcome::Resumed { generation, state })
    }

    fn spawn_loop(&self, slot: &mut LoopSlot, interval: Duration, interval_secs: i64) -> u64 {
        slot.next_generation += 1;
        let generation = slot.next_generation;
        let cancel = CancellationToken::new();

        if let Err(e) = self.host.enter_keep_alive(&keep_alive_status(interval_secs)) {
            warn!(generation, "keep-alive refused, running without it: {e}");
        }

        let emission = EmissionLoop::new(
            generation,
            interval,
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.sink_gate),
            cancel.clone(),
            self.events.clone(),
        );
        let handle = self.runtime.spawn(emission.run());
        slot.running = Some(RunningLoop {
            generation,
            cancel,
            handle,
        });
        generation
    }

    /// Cancel and forget the running loop. Returns its generation.
    fn cancel_running(&self, slot: &mut LoopSlot, desired: bool) -> Option<u64> {
        let running = slot.running.take()?;
        running.cancel.cancel();
        self.publish(LoggingEvent::Stopped {
            generation: running.generation,
            desired,
        });
        Some(running.generation)
    }

    fn lock_slot(&self) -> MutexGuard<'_, LoopSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: LoggingEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = slot.running.take() {
            running.cancel.cancel();
        }
    }
}

fn interval_duration(interval_secs: i64) -> Result<Duration> {
    match u64::try_from(interval_secs) {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(HeartlogError::InvalidArgument(format!(
            "interval must be > 0 seconds, got {interval_secs}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::process::NoopProcessHost;
    use crate::sink::MemorySink;
    use crate::state::MemoryStateStore;

    fn controller_with(
        initial: LoggingState,
    ) -> (LifecycleController, Arc<MemoryStateStore>, Arc<MemorySink>) {
        let store = Arc::new(MemoryStateStore::new(initial));
        let sink = Arc::new(MemorySink::new());
        let controller =
            LifecycleController::new(store.clone(), sink.clone(), Arc::new(NoopProcessHost))
                .expect("inside runtime");
        (controller, store, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn start_persists_before_returning() {
        let (controller, store, _sink) = controller_with(LoggingState {
            counter: 40,
            ..LoggingState::default()
        });
        let state = controller.start(7).expect("start");
        assert_eq!(
            state,
            LoggingState {
                active: true,
                interval_secs: 7,
                counter: 0
            }
        );
        assert_eq!(store.get().unwrap(), state);
        assert!(controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejects_non_positive_interval_without_mutation() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        for bad in [0, -1, i64::MIN] {
            let err = controller.start(bad).expect_err("must reject");
            assert!(matches!(err, HeartlogError::InvalidArgument(_)));
        }
        assert_eq!(store.get().unwrap(), LoggingState::default());
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_surfaces_persistence_error_and_spawns_nothing() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        store.set_fail_writes(true);
        let err = controller.start(3).expect_err("persist fails");
        assert!(matches!(err, HeartlogError::Persistence(_)));
        assert!(!controller.is_running());
        assert!(!store.get().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_restores_previous_loop() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        controller.start(2).expect("start");
        store.set_fail_writes(true);

        assert!(controller.start(9).is_err());
        let status = controller.current_status().unwrap();
        assert!(status.running);
        assert_eq!(status.interval_secs, 2);
        assert_eq!(status.generation, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_persists_inactive_and_cancels() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        controller.start(1).expect("start");
        let state = controller.stop().expect("stop");
        assert!(!state.active);
        assert!(!store.get().unwrap().active);
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_loop_is_noop() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        controller.stop().expect("stop");
        assert_eq!(store.get().unwrap(), LoggingState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_failure_keeps_loop_running() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        controller.start(1).expect("start");
        store.set_fail_writes(true);
        assert!(matches!(
            controller.stop(),
            Err(HeartlogError::Persistence(_))
        ));
        assert!(controller.is_running());
        assert!(store.get().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_inactive_is_noop() {
        let (controller, store, _sink) = controller_with(LoggingState {
            counter: 5,
            ..LoggingState::default()
        });
        assert_eq!(
            controller.reconcile(ReconcileTrigger::Boot).unwrap(),
            ReconcileOutcome::Inactive
        );
        assert!(!controller.is_running());
        assert_eq!(store.get().unwrap().counter, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_is_idempotent() {
        let (controller, _store, _sink) = controller_with(LoggingState {
            active: true,
            interval_secs: 5,
            counter: 3,
        });
        let first = controller.reconcile(ReconcileTrigger::ProcessStart).unwrap();
        let ReconcileOutcome::Resumed { generation, state } = first else {
            panic!("expected resume, got {first:?}");
        };
        assert_eq!(state.counter, 3);

        let second = controller.reconcile(ReconcileTrigger::Boot).unwrap();
        assert_eq!(second, ReconcileOutcome::AlreadyRunning { generation });
    }

    #[tokio::test(start_paused = true)]
    async fn preserve_policy_keeps_counter_on_start() {
        let (controller, _store, _sink) = controller_with(LoggingState {
            counter: 11,
            ..LoggingState::default()
        });
        let controller = controller.with_start_policy(StartPolicy::PreserveCounter);
        let state = controller.start(4).expect("start");
        assert_eq!(state.counter, 11);
        assert!(state.active);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_keeps_counter_by_default() {
        let (controller, store, sink) = controller_with(LoggingState {
            counter: 8,
            ..LoggingState::default()
        });
        controller.note("hello").expect("note");
        controller.clear().expect("clear");
        assert!(sink.lines().is_empty());
        assert_eq!(store.get().unwrap().counter, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_can_reset_counter() {
        let (controller, store, _sink) = controller_with(LoggingState {
            counter: 8,
            ..LoggingState::default()
        });
        let controller = controller.with_clear_resets_counter(true);
        controller.clear().expect("clear");
        assert_eq!(store.get().unwrap().counter, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_desired_state() {
        let (controller, store, _sink) = controller_with(LoggingState::default());
        controller.start(2).expect("start");
        controller.shutdown();
        assert!(!controller.is_running());
        assert!(store.get().unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn note_uses_bracketed_timestamp() {
        let (controller, _store, sink) = controller_with(LoggingState::default());
        controller.note("Host started").expect("note");
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Host started\n"));
    }

    #[test]
    fn new_outside_runtime_fails() {
        let store = Arc::new(MemoryStateStore::default());
        let sink = Arc::new(MemorySink::new());
        let result = LifecycleController::new(store, sink, Arc::new(NoopProcessHost));
        assert!(matches!(result, Err(HeartlogError::Runtime(_))));
    }
}
