use super::{BackupError, Result};
use std::sync::Mutex;
use tracing::debug;

/// State of one independently tracked operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Pending,
    Succeeded,
    Failed(String),
}

/// In-flight tracking for a single operation kind.
///
/// Each mutating operation owns its own tracker so that a pending restore does
/// not block, say, a trigger. A second `begin` while pending is refused.
#[derive(Debug)]
pub struct OperationTracker {
    name: &'static str,
    state: Mutex<OperationState>,
}

impl OperationTracker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(OperationState::Idle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> OperationState {
        self.lock().clone()
    }

    pub fn is_pending(&self) -> bool {
        *self.lock() == OperationState::Pending
    }

    pub fn begin(&self) -> Result<InFlight<'_>> {
        let mut state = self.lock();
        if *state == OperationState::Pending {
            return Err(BackupError::AlreadyInFlight {
                operation: self.name,
            });
        }
        *state = OperationState::Pending;
        debug!("{} pending", self.name);

        Ok(InFlight {
            tracker: self,
            settled: false,
        })
    }

    fn settle(&self, next: OperationState) {
        debug!("{} -> {:?}", self.name, next);
        *self.lock() = next;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OperationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held while an operation is pending. Dropping it unsettled (for example when
/// the future running the operation is dropped) returns the tracker to `Idle`.
#[must_use = "an in-flight operation must be settled"]
#[derive(Debug)]
pub struct InFlight<'a> {
    tracker: &'a OperationTracker,
    settled: bool,
}

impl InFlight<'_> {
    pub fn succeed(mut self) {
        self.settled = true;
        self.tracker.settle(OperationState::Succeeded);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.settled = true;
        self.tracker.settle(OperationState::Failed(message.into()));
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(OperationState::Idle);
        }
    }
}
