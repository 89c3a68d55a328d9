// Lock manager - counting-semaphore admission over a shared lease store.

use crate::store::{LeaseClaim, LeaseStore};
use crate::{LockId, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Admits, releases and reaps time-bounded leases against named keys.
///
/// Holds no state between calls beyond the shared store handle; every
/// correctness-critical step runs as one atomic store operation, so any
/// number of managers over the same store behave as one.
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// Try to take one slot of `key`'s capacity for `ttl`.
    ///
    /// Stale membership entries are reaped first so an expired holder never
    /// blocks admission. `Ok(None)` means the key is at capacity — an
    /// expected outcome, not a fault. `maximum_locks` of zero always refuses.
    pub async fn acquire(
        &self,
        key: &str,
        maximum_locks: u64,
        ttl: Duration,
    ) -> Result<Option<LockId>> {
        self.reap(key).await?;

        let lock_id = LockId::new();
        let claims = [(key.to_string(), lock_id.to_string())];
        if self.store.admit(&claims, maximum_locks, ttl).await? {
            debug!(key, %lock_id, "lease admitted");
            Ok(Some(lock_id))
        } else {
            debug!(key, "lease refused, key at capacity");
            Ok(None)
        }
    }

    /// All-or-nothing admission across several keys sharing one limit and
    /// one TTL: if any key is at capacity, no key receives a lease.
    ///
    /// Duplicate keys are collapsed (a key is never charged twice in one
    /// batch). Each admitted key gets its own lock id, since release
    /// resolves a single id to a single key. An empty key list admits
    /// trivially with an empty mapping.
    pub async fn acquire_many(
        &self,
        keys: &[String],
        maximum_locks: u64,
        ttl: Duration,
    ) -> Result<Option<HashMap<String, LockId>>> {
        let mut seen = std::collections::HashSet::new();
        let mut claims: Vec<LeaseClaim> = Vec::with_capacity(keys.len());
        let mut granted = HashMap::with_capacity(keys.len());

        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            self.reap(key).await?;
            let lock_id = LockId::new();
            claims.push((key.clone(), lock_id.to_string()));
            granted.insert(key.clone(), lock_id);
        }

        if self.store.admit(&claims, maximum_locks, ttl).await? {
            debug!(keys = claims.len(), "batch admitted");
            Ok(Some(granted))
        } else {
            debug!(keys = claims.len(), "batch refused");
            Ok(None)
        }
    }

    /// Give back a lease. Unknown or already-expired ids are a successful
    /// no-op, so release is safe to retry and safe to call late.
    pub async fn release(&self, lock_id: &str) -> Result<()> {
        match self.store.get(lock_id).await? {
            Some(key) => {
                self.store.purge(&key, lock_id).await?;
                debug!(%key, lock_id, "lease released");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Drop membership entries whose lease record no longer exists.
    ///
    /// Each member is checked and removed independently; the pass is
    /// idempotent and never evicts a member whose record is still live
    /// (lock ids are never reused, so a missing record stays missing).
    pub async fn reap(&self, key: &str) -> Result<()> {
        for member in self.store.set_members(key).await? {
            if self.store.get(&member).await?.is_none() {
                self.store.set_remove(key, &member).await?;
                debug!(key, %member, "reaped stale membership entry");
            }
        }
        Ok(())
    }

    /// Advisory head count for `key`. Stale the moment it is read; the
    /// admission check never goes through here.
    pub async fn count(&self, key: &str) -> Result<u64> {
        self.store.set_cardinality(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_acquire_then_refuse_at_capacity() {
        let manager = manager();
        let ttl = Duration::from_secs(60);

        let first = manager.acquire("k1", 1, ttl).await.unwrap();
        assert!(first.is_some());

        let second = manager.acquire("k1", 1, ttl).await.unwrap();
        assert!(second.is_none());
        assert_eq!(manager.count("k1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_always_refuses() {
        let manager = manager();
        let granted = manager
            .acquire("k1", 0, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(granted.is_none());
        assert_eq!(manager.count("k1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_release_frees_exactly_one_slot() {
        let manager = manager();
        let ttl = Duration::from_secs(60);

        let first = manager.acquire("k1", 2, ttl).await.unwrap().unwrap();
        manager.acquire("k1", 2, ttl).await.unwrap().unwrap();
        assert!(manager.acquire("k1", 2, ttl).await.unwrap().is_none());

        manager.release(&first.to_string()).await.unwrap();
        assert_eq!(manager.count("k1").await.unwrap(), 1);
        assert!(manager.acquire("k1", 2, ttl).await.unwrap().is_some());
        assert!(manager.acquire("k1", 2, ttl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_ids_are_distinct() {
        let manager = manager();
        let keys = vec!["k1".to_string(), "k2".to_string()];
        let granted = manager
            .acquire_many(&keys, 1, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(granted.len(), 2);
        assert_ne!(granted["k1"], granted["k2"]);
    }

    #[tokio::test]
    async fn test_batch_collapses_duplicate_keys() {
        let manager = manager();
        let keys = vec!["k1".to_string(), "k1".to_string(), "k2".to_string()];
        let granted = manager
            .acquire_many(&keys, 1, Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(granted.len(), 2);
        assert_eq!(manager.count("k1").await.unwrap(), 1);
    }
}
