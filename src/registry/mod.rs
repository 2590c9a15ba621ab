//! Subscription registry.
//!
//! Answers "who receives this message type?" for one publisher endpoint,
//! from a cached snapshot backed by a [`SubscriptionStore`].
//!
//! ## Data flow
//! ```text
//! lookup:   registry --> cache (hit) ------------------------> targets
//!                          |
//!                          +--(empty/stale)--> store --> refill --> targets
//!
//! mutation: registry --> store (upsert/delete) --> cache dropped
//! ```
//!
//! Every operation takes an optional ambient connection; see
//! [`AmbientConnection`](crate::storage::AmbientConnection).

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::storage::{Ambient, AmbientConnection, Result, SubscriptionStore};
use crate::subscription::Subscription;

mod cache;

pub use cache::{Snapshot, SubscriptionCache};

/// Subscription registry for a single publisher endpoint.
///
/// Safe to share across tasks. Lookups are served from a snapshot that is
/// reloaded when it is missing or older than the TTL; mutations write
/// through to the store and drop the snapshot.
///
/// A lookup made with an open ambient connection may see the host's
/// uncommitted writes, so its result is returned but never cached; a
/// rollback cannot leave phantom subscribers behind.
///
/// A mutation made through an ambient connection becomes visible to other
/// connections only when the host commits. A lookup from elsewhere between
/// the mutation and the commit can cache the pre-commit state until the TTL
/// runs out; hosts that need tighter bounds call
/// [`invalidate_cache`](Self::invalidate_cache) after committing.
pub struct SubscriptionRegistry<S: SubscriptionStore> {
    store: S,
    endpoint: String,
    auto_create_table: bool,
    cache: SubscriptionCache,
    initialized: OnceCell<()>,
}

impl<S: SubscriptionStore> SubscriptionRegistry<S> {
    /// Create a registry publishing as `endpoint`, with table auto-creation
    /// on and the default cache TTL.
    pub fn new(store: S, endpoint: impl Into<String>) -> Self {
        Self::from_config(store, &RegistryConfig::for_endpoint(endpoint))
    }

    pub fn from_config(store: S, config: &RegistryConfig) -> Self {
        Self {
            store,
            endpoint: config.endpoint.clone(),
            auto_create_table: config.auto_create_table,
            cache: SubscriptionCache::new(config.cache_ttl()),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = SubscriptionCache::new(ttl);
        self
    }

    pub fn with_auto_create_table(mut self, enabled: bool) -> Self {
        self.auto_create_table = enabled;
        self
    }

    /// This registry's publisher endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// True while a snapshot is cached, fresh or not.
    pub fn is_cache_populated(&self) -> bool {
        self.cache.is_populated()
    }

    /// Endpoints subscribed to `message_type`.
    ///
    /// Served from the cached snapshot when it is fresh; otherwise reloads
    /// every live subscription of this publisher in one store round-trip.
    /// A failed reload is returned as an error and leaves the cache empty.
    /// A reload through an open ambient connection is not cached.
    pub async fn target_endpoints(
        &self,
        ambient: Ambient<'_, '_, S::Connection>,
        message_type: &str,
    ) -> Result<BTreeSet<String>> {
        let mut ambient = ambient;
        self.initialize(ambient.as_deref_mut()).await;

        if let Some(snapshot) = self.cache.fresh() {
            return Ok(snapshot.targets(message_type));
        }

        let uncommitted = ambient.as_deref().is_some_and(AmbientConnection::is_open);
        let generation = self.cache.begin_reload();
        let rows = self
            .store
            .load_live(ambient, &self.endpoint, Utc::now())
            .await?;

        let snapshot = Snapshot::from_rows(rows);
        if uncommitted {
            return Ok(snapshot.targets(message_type));
        }

        let snapshot = self.cache.install(generation, snapshot);
        debug!(
            publisher = %self.endpoint,
            message_types = snapshot.message_types(),
            "subscription cache reloaded"
        );

        Ok(snapshot.targets(message_type))
    }

    /// Subscribe `subscriber` to `message_type` until `expires_at`, or
    /// forever when `None`.
    ///
    /// An expiration already in the past is ignored. Subscribing again with
    /// the same key refreshes the expiration of the existing row.
    pub async fn subscribe(
        &self,
        ambient: Ambient<'_, '_, S::Connection>,
        subscriber: &str,
        message_type: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut ambient = ambient;
        self.initialize(ambient.as_deref_mut()).await;

        let now = Utc::now();
        if expires_at.is_some_and(|at| at < now) {
            debug!(subscriber, message_type, "ignoring subscription that already expired");
            return Ok(());
        }

        let subscription = Subscription::new(&self.endpoint, subscriber, message_type, expires_at, now);
        self.store.upsert(ambient, &subscription).await?;
        self.cache.invalidate();

        debug!(subscriber, message_type, expires_at = ?expires_at, "subscribed");
        Ok(())
    }

    /// Remove the subscription of `subscriber` to `message_type`. Removing a
    /// subscription that does not exist is not an error.
    pub async fn unsubscribe(
        &self,
        ambient: Ambient<'_, '_, S::Connection>,
        subscriber: &str,
        message_type: &str,
    ) -> Result<()> {
        let mut ambient = ambient;
        self.initialize(ambient.as_deref_mut()).await;

        let removed = self
            .store
            .delete(ambient, &self.endpoint, subscriber, message_type)
            .await?;
        self.cache.invalidate();

        debug!(subscriber, message_type, removed, "unsubscribed");
        Ok(())
    }

    /// Delete the subscription if its expiration has passed.
    ///
    /// Meant to be called before delivering to a specific subscriber. Only
    /// an actual deletion drops the cache.
    pub async fn handle_expiration_if_necessary(
        &self,
        ambient: Ambient<'_, '_, S::Connection>,
        subscriber: &str,
        message_type: &str,
    ) -> Result<()> {
        let mut ambient = ambient;
        self.initialize(ambient.as_deref_mut()).await;

        let removed = self
            .store
            .delete_expired(ambient, &self.endpoint, subscriber, message_type, Utc::now())
            .await?;
        if removed == 0 {
            return Ok(());
        }

        warn!(subscriber, message_type, "Subscription expired");
        self.cache.invalidate();
        Ok(())
    }

    /// Every stored subscription of this publisher, including expired rows
    /// not yet swept. Reads the store directly.
    pub async fn subscriptions(
        &self,
        ambient: Ambient<'_, '_, S::Connection>,
    ) -> Result<Vec<Subscription>> {
        let mut ambient = ambient;
        self.initialize(ambient.as_deref_mut()).await;
        self.store.list(ambient, &self.endpoint).await
    }

    /// Drop the cached snapshot so the next lookup reads the store.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// One-time table bootstrap.
    ///
    /// Runs at most once per registry; concurrent first callers wait for the
    /// one doing the work. Failures are logged and not retried: later
    /// operations surface the broken table as store errors of their own.
    async fn initialize(&self, ambient: Ambient<'_, '_, S::Connection>) {
        self.initialized
            .get_or_init(|| async move {
                if !self.auto_create_table {
                    return;
                }
                match self.store.create_schema(ambient).await {
                    Ok(()) => info!(publisher = %self.endpoint, "subscription table ready"),
                    Err(e) => error!(
                        publisher = %self.endpoint,
                        error = %e,
                        "Error initializing subscription table"
                    ),
                }
            })
            .await;
    }
}
