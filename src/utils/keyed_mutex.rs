use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-session locks.
///
/// Serialises metadata read-modify-write cycles for one session id while
/// leaving other sessions free to proceed.
#[derive(Debug, Clone, Default)]
pub struct KeyedMutex {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Waits for the lock on `key`. Released when the guard is dropped.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // The map entry must not be borrowed across the await.
        let mutex = self.entry(key);
        mutex.lock_owned().await
    }

    /// Takes the lock on `key` only if nobody holds it.
    pub fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).try_lock_owned().ok()
    }

    /// Drops entries nobody is holding or waiting on.
    pub fn cleanup(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_lock_respects_holder() {
        let locks = KeyedMutex::new();
        let guard = locks.lock("a").await;
        assert!(locks.try_lock("a").is_none());
        assert!(locks.try_lock("b").is_some());
        drop(guard);
        assert!(locks.try_lock("a").is_some());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_held_entries() {
        let locks = KeyedMutex::new();
        let _held = locks.lock("held").await;
        drop(locks.lock("idle").await);
        assert_eq!(locks.len(), 2);
        locks.cleanup();
        assert_eq!(locks.len(), 1);
        assert!(locks.try_lock("held").is_none());
    }
}
