//! Mock subscription store for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{Ambient, ConnectionTarget, Result, StorageError, SubscriptionStore};
use crate::subscription::Subscription;

/// Key type for stored rows: (publisher, subscriber, message_type).
type SubscriptionKey = (String, String, String);

/// Stand-in for a database connection.
///
/// Counts the statements run on it, so tests can tell whether a store call
/// used the ambient connection or one of its own.
#[derive(Debug, Default)]
pub struct MockConnection {
    pub statements: usize,
}

/// Mock subscription store that keeps rows in memory.
#[derive(Default)]
pub struct MockSubscriptionStore {
    rows: RwLock<BTreeMap<SubscriptionKey, Subscription>>,
    target: Option<ConnectionTarget>,
    schema_calls: AtomicUsize,
    load_calls: AtomicUsize,
    owned_connections: AtomicUsize,
    fail_on_schema: AtomicBool,
    fail_on_load: AtomicBool,
    fail_on_write: AtomicBool,
}

impl MockSubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only reuse ambient connections pointing at `target`.
    pub fn with_target(mut self, target: ConnectionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn set_fail_on_schema(&self, fail: bool) {
        self.fail_on_schema.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_load(&self, fail: bool) {
        self.fail_on_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Number of `create_schema` calls.
    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    /// Number of `load_live` calls.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of calls that ran on a store-owned connection.
    pub fn owned_connections(&self) -> usize {
        self.owned_connections.load(Ordering::SeqCst)
    }

    /// Number of stored rows, expired or not.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Insert a row directly, bypassing the registry.
    pub async fn insert_raw(&self, subscription: Subscription) {
        let key = (
            subscription.publisher_endpoint.clone(),
            subscription.subscriber_endpoint.clone(),
            subscription.message_type.clone(),
        );
        self.rows.write().await.insert(key, subscription);
    }

    /// Record one statement, on the ambient connection when reusable.
    fn execute(&self, ambient: Ambient<'_, '_, MockConnection>) {
        match ambient.and_then(|a| a.reusable_for(self.target.as_ref())) {
            Some(conn) => conn.statements += 1,
            None => {
                self.owned_connections.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("mock {} failure", what)));
        }
        Ok(())
    }
}

fn key(publisher: &str, subscriber: &str, message_type: &str) -> SubscriptionKey {
    (publisher.to_string(), subscriber.to_string(), message_type.to_string())
}

#[async_trait]
impl SubscriptionStore for MockSubscriptionStore {
    type Connection = MockConnection;

    async fn create_schema(&self, ambient: Ambient<'_, '_, MockConnection>) -> Result<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_on_schema, "schema")?;
        self.execute(ambient);
        Ok(())
    }

    async fn load_live(
        &self,
        ambient: Ambient<'_, '_, MockConnection>,
        publisher: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_on_load, "load")?;
        self.execute(ambient);

        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|s| s.publisher_endpoint == publisher)
            .filter(|s| s.expires_at.map_or(true, |at| at >= now))
            .map(|s| (s.message_type.clone(), s.subscriber_endpoint.clone()))
            .collect())
    }

    async fn list(
        &self,
        ambient: Ambient<'_, '_, MockConnection>,
        publisher: &str,
    ) -> Result<Vec<Subscription>> {
        Self::check(&self.fail_on_load, "load")?;
        self.execute(ambient);

        let mut listed: Vec<Subscription> = self
            .rows
            .read()
            .await
            .values()
            .filter(|s| s.publisher_endpoint == publisher)
            .cloned()
            .collect();
        listed.sort_by(|a, b| {
            (&a.message_type, &a.subscriber_endpoint).cmp(&(&b.message_type, &b.subscriber_endpoint))
        });
        Ok(listed)
    }

    async fn upsert(
        &self,
        ambient: Ambient<'_, '_, MockConnection>,
        subscription: &Subscription,
    ) -> Result<()> {
        Self::check(&self.fail_on_write, "write")?;
        self.execute(ambient);

        let mut rows = self.rows.write().await;
        rows.entry(key(
            &subscription.publisher_endpoint,
            &subscription.subscriber_endpoint,
            &subscription.message_type,
        ))
        .and_modify(|existing| existing.expires_at = subscription.expires_at)
        .or_insert_with(|| subscription.clone());
        Ok(())
    }

    async fn delete(
        &self,
        ambient: Ambient<'_, '_, MockConnection>,
        publisher: &str,
        subscriber: &str,
        message_type: &str,
    ) -> Result<u64> {
        Self::check(&self.fail_on_write, "write")?;
        self.execute(ambient);

        let removed = self
            .rows
            .write()
            .await
            .remove(&key(publisher, subscriber, message_type));
        Ok(removed.map_or(0, |_| 1))
    }

    async fn delete_expired(
        &self,
        ambient: Ambient<'_, '_, MockConnection>,
        publisher: &str,
        subscriber: &str,
        message_type: &str,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        Self::check(&self.fail_on_write, "write")?;
        self.execute(ambient);

        let mut rows = self.rows.write().await;
        let key = key(publisher, subscriber, message_type);
        if rows.get(&key).is_some_and(|s| s.is_expired(now)) {
            rows.remove(&key);
            return Ok(1);
        }
        Ok(0)
    }
}
