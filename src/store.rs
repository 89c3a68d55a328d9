use crate::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// One (key, lock id) pair a caller wants admitted.
pub type LeaseClaim = (String, String);

/// Backend contract for lease records and per-key membership sets.
///
/// Record ids and set keys live in separate namespaces. Expired records read
/// as absent; membership sets are NOT pruned on expiry — `set_cardinality`
/// deliberately counts stale members, and reaping removes them.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, id: &str) -> Result<Option<String>>;
    async fn set_with_expiry(&self, id: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
    async fn set_cardinality(&self, key: &str) -> Result<u64>;

    /// Atomic check-then-admit spanning every claim: if any claimed key
    /// already holds `maximum_locks` or more members, nothing is written and
    /// `false` comes back. Otherwise each claim's lock id is added to its
    /// key's set and given a lease record expiring `ttl` from now, and the
    /// whole step is indivisible with respect to every other call.
    async fn admit(&self, claims: &[LeaseClaim], maximum_locks: u64, ttl: Duration)
        -> Result<bool>;

    /// Atomically drop both halves of a lease: the membership entry and the
    /// record. Absent halves are ignored.
    async fn purge(&self, key: &str, lock_id: &str) -> Result<()>;
}

#[derive(Debug)]
struct Record {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: HashMap<String, Record>,
    sets: HashMap<String, HashSet<String>>,
}

impl StoreInner {
    /// Passive expiry: drop the record on access if its deadline passed.
    fn live_value(&mut self, id: &str) -> Option<String> {
        let expired = match self.records.get(id) {
            Some(record) => record.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.records.remove(id);
            return None;
        }
        self.records.get(id).map(|record| record.value.clone())
    }

    fn remove_member(&mut self, key: &str, member: &str) {
        if let Some(members) = self.sets.get_mut(key) {
            members.remove(member);
            if members.is_empty() {
                self.sets.remove(key);
            }
        }
    }
}

/// Single-process lease store. One mutex guards records and sets together so
/// that a multi-key `admit` observes and mutates all of them in one critical
/// section; the lock is never held across an await point.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().live_value(id))
    }

    async fn set_with_expiry(&self, id: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.records.insert(
            id.to_string(),
            Record {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.lock().records.remove(id);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        self.inner.lock().remove_member(key, member);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_cardinality(&self, key: &str) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner.sets.get(key).map_or(0, |members| members.len() as u64))
    }

    async fn admit(
        &self,
        claims: &[LeaseClaim],
        maximum_locks: u64,
        ttl: Duration,
    ) -> Result<bool> {
        let mut inner = self.inner.lock();

        for (key, _) in claims {
            let held = inner.sets.get(key).map_or(0, |members| members.len() as u64);
            if held >= maximum_locks {
                return Ok(false);
            }
        }

        let expires_at = Instant::now() + ttl;
        for (key, lock_id) in claims {
            inner
                .sets
                .entry(key.clone())
                .or_default()
                .insert(lock_id.clone());
            inner.records.insert(
                lock_id.clone(),
                Record {
                    value: key.clone(),
                    expires_at,
                },
            );
        }
        Ok(true)
    }

    async fn purge(&self, key: &str, lock_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.remove_member(key, lock_id);
        inner.records.remove(lock_id);
        Ok(())
    }
}
