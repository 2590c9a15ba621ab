//! Subscription records and their timestamp encoding.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::storage::{Result, StorageError};

/// A persisted subscription row.
///
/// Keyed by `(publisher_endpoint, subscriber_endpoint, message_type)`.
/// `expires_at = None` means the subscription never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub publisher_endpoint: String,
    pub subscriber_endpoint: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create a subscription for `publisher` stamped with `now`.
    pub fn new(
        publisher: &str,
        subscriber: &str,
        message_type: &str,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            publisher_endpoint: publisher.to_string(),
            subscriber_endpoint: subscriber.to_string(),
            message_type: message_type.to_string(),
            created_at: now,
            expires_at,
        }
    }

    /// True once `expires_at` is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Encode a timestamp as fixed-width RFC 3339 text.
///
/// Microsecond precision with a `Z` suffix keeps lexical order equal to
/// temporal order, so stores can compare the text columns directly.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a timestamp written by [`encode_timestamp`].
pub fn decode_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(text.to_string()))
}
