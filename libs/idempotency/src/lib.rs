//! In-process idempotency store for inbound chat-platform events.
//!
//! The bridge is a single long-lived process with no distributed peers, so
//! the dedupe store lives entirely in memory; the state-file persistence
//! layer (`gsm-core`) is what makes it survive a restart.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::warn;

/// Default TTL for an inbound dedupe entry (§4.5).
pub const DEFAULT_TTL_SECS: u64 = 10 * 60;

/// Builds the fingerprint for a Slack `event_callback` payload.
pub fn slack_event_fingerprint(event_id: &str) -> String {
    format!("slack:event:{event_id}")
}

/// Builds the fingerprint for a Slack message-shaped event lacking an `event_id`.
pub fn slack_message_fingerprint(channel: &str, ts: &str) -> String {
    format!("slack:msg:{channel}:{ts}")
}

/// Builds the fingerprint for a Teams Bot Framework activity.
pub fn teams_message_fingerprint(conversation_id: &str, activity_id: &str) -> String {
    format!("teams:msg:{conversation_id}:{activity_id}")
}

/// Contract implemented by idempotency stores.
#[async_trait]
pub trait IdemStore: Send + Sync {
    /// Attempts to register `key` with the provided TTL. Returns `Ok(true)` when the
    /// key did not previously exist (meaning the caller should continue processing),
    /// `Ok(false)` for a duplicate.
    async fn put_if_absent(&self, key: &str, ttl_s: u64) -> Result<bool>;

    /// Returns a snapshot of currently-tracked, unexpired keys (for state persistence).
    async fn snapshot(&self) -> HashMap<String, OffsetDateTime>;

    /// Restores entries from a persisted snapshot, discarding already-expired ones.
    async fn restore(&self, entries: HashMap<String, OffsetDateTime>);

    /// Number of tracked (unexpired) keys.
    async fn len(&self) -> usize;
}

pub type SharedIdemStore = Arc<dyn IdemStore>;

/// In-memory dedupe store; the sole implementation used by the bridge.
#[derive(Clone, Default)]
pub struct InMemoryIdemStore {
    inner: Arc<RwLock<HashMap<String, OffsetDateTime>>>,
}

impl InMemoryIdemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn purge_expired(&self, now: OffsetDateTime) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, expires| *expires > now);
    }
}

#[async_trait]
impl IdemStore for InMemoryIdemStore {
    async fn put_if_absent(&self, key: &str, ttl_s: u64) -> Result<bool> {
        let ttl = Duration::seconds(ttl_s as i64);
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().await;
        guard.retain(|_, expires| *expires > now);
        match guard.get(key) {
            Some(exp) if *exp > now => Ok(false),
            _ => {
                guard.insert(key.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn snapshot(&self) -> HashMap<String, OffsetDateTime> {
        let now = OffsetDateTime::now_utc();
        let guard = self.inner.read().await;
        guard
            .iter()
            .filter(|(_, exp)| **exp > now)
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    async fn restore(&self, entries: HashMap<String, OffsetDateTime>) {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().await;
        guard.extend(entries.into_iter().filter(|(_, exp)| *exp > now));
    }

    async fn len(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        self.inner
            .read()
            .await
            .values()
            .filter(|exp| **exp > now)
            .count()
    }
}

/// Guard used by inbound handlers to deduplicate envelopes (C5).
#[derive(Clone)]
pub struct IdempotencyGuard {
    ttl_secs: u64,
    store: SharedIdemStore,
}

impl IdempotencyGuard {
    pub fn new(store: SharedIdemStore) -> Self {
        Self {
            store,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(store: SharedIdemStore, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    /// Returns `Ok(true)` when the caller should proceed (first sighting).
    pub async fn should_process(&self, fingerprint: &str) -> Result<bool> {
        let inserted = self.store.put_if_absent(fingerprint, self.ttl_secs).await?;
        if !inserted {
            warn!(fingerprint, "duplicate inbound event dropped");
            metrics::counter!("inbound_deduped_total").increment(1);
        }
        Ok(inserted)
    }

    pub fn store(&self) -> &SharedIdemStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_dedupes() {
        let store = InMemoryIdemStore::new();
        assert!(store.put_if_absent("k", 10).await.unwrap());
        assert!(!store.put_if_absent("k", 10).await.unwrap());
        store.inner.write().await.insert(
            "expired".into(),
            OffsetDateTime::now_utc() - Duration::seconds(5),
        );
        assert!(store.put_if_absent("expired", 1).await.unwrap());
    }

    #[tokio::test]
    async fn guard_should_process() {
        let store: SharedIdemStore = Arc::new(InMemoryIdemStore::new());
        let guard = IdempotencyGuard::new(store);
        let key = slack_event_fingerprint("Ev123");
        assert!(guard.should_process(&key).await.unwrap());
        assert!(!guard.should_process(&key).await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_restore() {
        let store = InMemoryIdemStore::new();
        store.put_if_absent("a", 600).await.unwrap();
        store.put_if_absent("b", 600).await.unwrap();
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 2);

        let restored = InMemoryIdemStore::new();
        restored.restore(snapshot).await;
        assert!(!restored.put_if_absent("a", 600).await.unwrap());
        assert!(!restored.put_if_absent("b", 600).await.unwrap());
    }

    #[test]
    fn fingerprints_are_namespaced_per_platform() {
        assert_eq!(slack_event_fingerprint("Ev1"), "slack:event:Ev1");
        assert_eq!(
            slack_message_fingerprint("C1", "171.1"),
            "slack:msg:C1:171.1"
        );
        assert_eq!(
            teams_message_fingerprint("conv1", "act1"),
            "teams:msg:conv1:act1"
        );
    }
}
