use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owns the delayed payment-status checks scheduled after a reminder.
///
/// One task per payment reference: scheduling the same reference again
/// replaces the pending task. Best effort: a dropped re-check is caught by the
/// next periodic scan.
#[derive(Default, Clone)]
pub struct RecheckRegistry {
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl RecheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `check` once `delay` has elapsed, unless cancelled first.
    pub fn schedule<F>(&self, payment_id: impl Into<String>, delay: Duration, check: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let payment_id = payment_id.into();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = tasks.remove(&payment_id) {
            debug!(payment_id = %payment_id, "replacing pending re-check");
            previous.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            check.await;
        });
        tasks.insert(payment_id, handle);
    }

    /// Cancels the pending re-check for `payment_id`. Returns whether one was pending.
    pub fn cancel(&self, payment_id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.remove(payment_id) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Number of re-checks that have not completed yet.
    pub fn pending(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().filter(|handle| !handle.is_finished()).count()
    }

    /// Waits for every pending re-check when `drain` is set, aborts them otherwise.
    pub async fn shutdown(&self, drain: bool) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain().collect()
        };
        for (payment_id, handle) in handles {
            if !drain {
                handle.abort();
                continue;
            }
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!(payment_id = %payment_id, error = %e, "re-check task failed");
            }
        }
    }
}
