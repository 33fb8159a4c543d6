//! In-process state store.

use super::{LoggingState, StateStore};
use crate::error::{HeartlogError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Non-durable store for ephemeral runs and tests.
///
/// [`set_fail_writes`](Self::set_fail_writes) makes every subsequent write
/// fail with [`HeartlogError::Persistence`], for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<LoggingState>,
    fail_writes: AtomicBool,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new(initial: LoggingState) -> Self {
        Self {
            state: Mutex::new(initial),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self) -> Result<LoggingState> {
        Ok(*self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn update(&self, apply: &mut dyn FnMut(&mut LoggingState) -> bool) -> Result<LoggingState> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = *guard;
        if !apply(&mut next) {
            return Ok(*guard);
        }
        next.validate()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HeartlogError::Persistence(
                "memory store configured to fail writes".to_owned(),
            ));
        }
        *guard = next;
        Ok(next)
    }
}
