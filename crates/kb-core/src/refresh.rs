//! Single-flight guard for refreshes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Serializes runs and coalesces callers that queued behind a run.
///
/// Every request and every run start draws a number from one counter. When
/// a caller gets the lock and finds that the last run started after its own
/// request, that run already reflects the state the caller asked about and
/// its outcome is returned instead of running again.
#[derive(Debug)]
pub struct SingleFlight<T> {
    counter: AtomicU64,
    last: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run `task`, or share the outcome of a run that started after this call.
    ///
    /// Returns the outcome and whether it was shared.
    pub async fn run<F, Fut>(&self, task: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let requested = self.next();
        let mut last = self.last.lock().await;

        if let Some((started, outcome)) = last.as_ref()
            && *started > requested
        {
            debug!(requested, started, "joining refresh that started after request");
            return (outcome.clone(), true);
        }

        let started = self.next();
        let outcome = task().await;
        *last = Some((started, outcome.clone()));
        (outcome, false)
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
