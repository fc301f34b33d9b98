use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::key::DraftKey;

const PRUNE_THRESHOLD: usize = 1024;

/// Per-draft async locks. Holding the guard serializes read-modify-write
/// sequences on one key while other keys proceed independently.
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<DraftKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &DraftKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() >= PRUNE_THRESHOLD {
                // only the map holds it: nobody waiting or locked
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let key = DraftKey::from("k1");

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(&DraftKey::from("a")).await;
        let _b = locks.acquire(&DraftKey::from("b")).await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = KeyLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.acquire(&DraftKey::from(format!("k{}", i))).await);
        }
        assert_eq!(locks.tracked(), PRUNE_THRESHOLD);

        let _held = locks.acquire(&DraftKey::from("fresh")).await;
        assert_eq!(locks.tracked(), 1);
    }
}
