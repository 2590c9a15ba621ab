//! Subscription table schema using sea-query.
//!
//! The table name is configurable, so it is carried as a validated
//! [`TableName`] and handed to the query builder as a quoted identifier.

use std::fmt;

use sea_query::{Alias, ColumnDef, Iden, Index, Table, TableCreateStatement};
use serde::Deserialize;

/// Default subscriptions table name.
pub const DEFAULT_TABLE_NAME: &str = "message_bus_subscriptions";

const MAX_TABLE_NAME_LEN: usize = 63;
const ENDPOINT_LEN: u32 = 200;
const MESSAGE_TYPE_LEN: u32 = 200;
const TIMESTAMP_LEN: u32 = 32;

/// Subscription table columns.
#[derive(Iden)]
pub enum Subscriptions {
    #[iden = "publisher_endpoint"]
    PublisherEndpoint,
    #[iden = "subscriber_endpoint"]
    SubscriberEndpoint,
    #[iden = "message_type"]
    MessageType,
    #[iden = "created_date"]
    CreatedDate,
    #[iden = "expiration_date"]
    ExpirationDate,
}

/// A table identifier: ASCII letter or underscore, then letters, digits or
/// underscores, at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TableName(String);

/// Rejected table identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid table name '{0}': expected [A-Za-z_][A-Za-z0-9_]{{0,62}}")]
pub struct InvalidTableName(pub String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTableName> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_head && valid_tail && name.len() <= MAX_TABLE_NAME_LEN {
            Ok(Self(name))
        } else {
            Err(InvalidTableName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier for use in sea-query statements.
    pub fn iden(&self) -> Alias {
        Alias::new(self.0.as_str())
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE_NAME.to_string())
    }
}

impl TryFrom<String> for TableName {
    type Error = InvalidTableName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `CREATE TABLE IF NOT EXISTS` for the subscriptions table.
///
/// The natural key is the primary key, which is also what upserts resolve
/// conflicts against. Timestamps are fixed-width RFC 3339 text.
pub fn create_table(table: &TableName) -> TableCreateStatement {
    Table::create()
        .table(table.iden())
        .if_not_exists()
        .col(
            ColumnDef::new(Subscriptions::PublisherEndpoint)
                .string_len(ENDPOINT_LEN)
                .not_null(),
        )
        .col(
            ColumnDef::new(Subscriptions::SubscriberEndpoint)
                .string_len(ENDPOINT_LEN)
                .not_null(),
        )
        .col(
            ColumnDef::new(Subscriptions::MessageType)
                .string_len(MESSAGE_TYPE_LEN)
                .not_null(),
        )
        .col(
            ColumnDef::new(Subscriptions::CreatedDate)
                .string_len(TIMESTAMP_LEN)
                .not_null(),
        )
        .col(
            ColumnDef::new(Subscriptions::ExpirationDate)
                .string_len(TIMESTAMP_LEN)
                .null(),
        )
        .primary_key(
            Index::create()
                .col(Subscriptions::PublisherEndpoint)
                .col(Subscriptions::SubscriberEndpoint)
                .col(Subscriptions::MessageType),
        )
        .to_owned()
}
