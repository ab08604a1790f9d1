//! Per-`UserProgress` concurrency control.
//!
//! The progress row is the serialization point (spec §5): one turn runs at
//! a time per progress id, and a second concurrent turn on the same id is
//! rejected immediately rather than queued, so the caller gets a prompt
//! "busy" signal instead of an unbounded wait.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

pub struct ProgressLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl Default for ProgressLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire exclusive access to `progress_id` for one turn. Returns
    /// `Err(ProgressBusy)` immediately if another turn already holds it —
    /// this never blocks the caller.
    pub fn try_acquire(&self, progress_id: Uuid) -> Result<OwnedSemaphorePermit, ProgressBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(progress_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| ProgressBusy)
    }

    /// Number of tracked progress rows (for monitoring).
    pub fn tracked_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for progress rows with no in-flight turn.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[derive(Debug)]
pub struct ProgressBusy;

impl std::fmt::Display for ProgressBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a turn is already in progress for this user progress")
    }
}

impl std::error::Error for ProgressBusy {}
