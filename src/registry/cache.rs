//! Read-through snapshot cache of subscription targets.
//!
//! The cache holds at most one immutable [`Snapshot`] behind an `ArcSwap`.
//! Readers load it without locking; writers replace or drop it as a unit,
//! so a reader sees either a complete snapshot or none at all.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::time::Instant;

/// Subscriber endpoints per message type, as read from the store at one
/// point in time.
#[derive(Debug)]
pub struct Snapshot {
    targets: HashMap<String, BTreeSet<String>>,
    loaded_at: Instant,
    generation: u64,
}

impl Snapshot {
    /// Build a snapshot from `(message_type, subscriber_endpoint)` rows.
    pub fn from_rows(rows: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut targets: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (message_type, subscriber) in rows {
            targets.entry(message_type).or_default().insert(subscriber);
        }
        Self {
            targets,
            loaded_at: Instant::now(),
            generation: 0,
        }
    }

    /// Subscribers for `message_type`; empty when there are none.
    pub fn targets(&self, message_type: &str) -> BTreeSet<String> {
        self.targets.get(message_type).cloned().unwrap_or_default()
    }

    pub fn message_types(&self) -> usize {
        self.targets.len()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.loaded_at.elapsed() > ttl
    }
}

/// Snapshot holder with time-based and explicit invalidation.
///
/// Concurrent reloads are allowed; the last one to finish wins. Every
/// snapshot carries the generation its reload started in, and only a
/// snapshot of the current generation is ever served. A reload that started
/// before an invalidation is therefore invisible even if it lands in the
/// holder afterwards, so the next lookup after a mutation reads the store.
pub struct SubscriptionCache {
    ttl: Duration,
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
}

impl SubscriptionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The current snapshot if it belongs to the current generation and is
    /// younger than the TTL. Anything else is dropped on the way out.
    pub fn fresh(&self) -> Option<Arc<Snapshot>> {
        let snapshot = self.current.load_full()?;
        if !self.is_current(&snapshot) || snapshot.is_stale(self.ttl) {
            self.current.compare_and_swap(&Some(Arc::clone(&snapshot)), None::<Arc<Snapshot>>);
            return None;
        }
        Some(snapshot)
    }

    /// Token to pass to [`install`](Self::install) for a reload starting now.
    pub fn begin_reload(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Publish a freshly loaded snapshot and return it.
    ///
    /// If the cache was invalidated after `generation` was taken, the
    /// snapshot may predate a mutation: it is still returned to the caller
    /// that loaded it, but never served from the cache.
    pub fn install(&self, generation: u64, mut snapshot: Snapshot) -> Arc<Snapshot> {
        snapshot.generation = generation;
        let snapshot = Arc::new(snapshot);
        if !self.is_current(&snapshot) {
            return snapshot;
        }

        let installed = Some(Arc::clone(&snapshot));
        self.current.store(installed.clone());

        // Invalidated between the check and the store
        if !self.is_current(&snapshot) {
            self.current.compare_and_swap(&installed, None::<Arc<Snapshot>>);
        }
        snapshot
    }

    /// Drop the snapshot so the next lookup reloads.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.current.store(None);
    }

    /// True while a snapshot of the current generation is cached, fresh or
    /// not.
    pub fn is_populated(&self) -> bool {
        match &*self.current.load() {
            Some(snapshot) => self.is_current(snapshot),
            None => false,
        }
    }

    fn is_current(&self, snapshot: &Snapshot) -> bool {
        snapshot.generation == self.generation.load(Ordering::SeqCst)
    }
}
