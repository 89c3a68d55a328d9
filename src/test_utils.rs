use crate::store::{InMemoryStore, LeaseClaim, LeaseStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory store with a fault switch: once `fail()` is called, every
/// operation reports the store as unavailable until `recover()`.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("injected fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for FaultyStore {
    async fn get(&self, id: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn set_with_expiry(&self, id: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        self.inner.set_with_expiry(id, value, ttl).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.check()?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.check()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.set_members(key).await
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        self.check()?;
        self.inner.set_cardinality(key).await
    }

    async fn admit(
        &self,
        claims: &[LeaseClaim],
        maximum_locks: u64,
        ttl: Duration,
    ) -> Result<bool> {
        self.check()?;
        self.inner.admit(claims, maximum_locks, ttl).await
    }

    async fn purge(&self, key: &str, lock_id: &str) -> Result<()> {
        self.check()?;
        self.inner.purge(key, lock_id).await
    }
}
