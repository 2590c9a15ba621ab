//! Storage for subscription rows.
//!
//! The registry talks to its backing store only through [`SubscriptionStore`].
//! SQL backends live in [`sql`]; an in-memory store for tests lives in
//! [`mock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::subscription::Subscription;

pub mod connection;
pub mod schema;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use connection::{Ambient, AmbientConnection, ConnectionTarget};

#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteSubscriptionStore;

#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresSubscriptionStore;

/// Errors raised by subscription stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistent storage contract for subscriptions.
///
/// Every operation accepts an optional [`AmbientConnection`]: the connection
/// the host is using for the message currently being processed. An
/// implementation runs the statement on that connection when it is open and
/// targets the same database as the store, so the write commits or rolls
/// back together with the host's own work. Otherwise it uses a connection
/// of its own, scoped to the call.
///
/// Implementations never close, commit or roll back an ambient connection.
///
/// # Implementations
///
/// - `SqliteSubscriptionStore`: SQLite storage
/// - `PostgresSubscriptionStore`: PostgreSQL storage
/// - `MockSubscriptionStore`: In-memory mock for testing
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Connection type an ambient handle must borrow.
    type Connection: Send;

    /// Create the subscriptions table if it does not already exist.
    async fn create_schema(&self, ambient: Ambient<'_, '_, Self::Connection>) -> Result<()>;

    /// Load `(message_type, subscriber_endpoint)` pairs for `publisher`
    /// whose expiration is absent or not before `now`.
    async fn load_live(
        &self,
        ambient: Ambient<'_, '_, Self::Connection>,
        publisher: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>>;

    /// List every row for `publisher`, expired or not, ordered by message
    /// type then subscriber.
    async fn list(
        &self,
        ambient: Ambient<'_, '_, Self::Connection>,
        publisher: &str,
    ) -> Result<Vec<Subscription>>;

    /// Insert the subscription, or refresh `expires_at` on the existing row
    /// with the same natural key. `created_at` of an existing row is kept.
    async fn upsert(
        &self,
        ambient: Ambient<'_, '_, Self::Connection>,
        subscription: &Subscription,
    ) -> Result<()>;

    /// Delete the row for the natural key. Returns the number of rows removed.
    async fn delete(
        &self,
        ambient: Ambient<'_, '_, Self::Connection>,
        publisher: &str,
        subscriber: &str,
        message_type: &str,
    ) -> Result<u64>;

    /// Delete the row for the natural key only if it expired at or before
    /// `now`. Returns the number of rows removed.
    async fn delete_expired(
        &self,
        ambient: Ambient<'_, '_, Self::Connection>,
        publisher: &str,
        subscriber: &str,
        message_type: &str,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}
