use crate::domain::contact_log::ContactKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Write locks keyed by `(customer, day)`.
///
/// Serializes contact-log transactions on the same key while letting
/// different customers proceed in parallel. Unheld entries are pruned on
/// every acquisition, so the map only grows with live contention.
#[derive(Default, Clone)]
pub struct KeyLocks {
    locks: Arc<Mutex<HashMap<ContactKey, Arc<AsyncMutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: ContactKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn key(customer_id: u64) -> ContactKey {
        ContactKey::new(customer_id, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyLocks::new();
        let guard = locks.acquire(key(1)).await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move { contender.acquire(key(1)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        let second = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("lock was not released")
            .unwrap();
        drop(second);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _first = locks.acquire(key(1)).await;
        let second = tokio::time::timeout(Duration::from_millis(200), locks.acquire(key(2))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyLocks::new();
        drop(locks.acquire(key(1)).await);
        drop(locks.acquire(key(2)).await);
        let _held = locks.acquire(key(3)).await;
        assert_eq!(locks.tracked(), 1);
    }
}
