//! Unified SQL storage implementations.
//!
//! This module provides shared implementations for SQL-based storage backends
//! (PostgreSQL, SQLite). The implementations are parameterized by database type
//! using the `SqlDatabase` trait.

use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;

mod query;
mod subscription_store;

pub use query::SqlDatabase;
pub use subscription_store::SqlSubscriptionStore;

/// A connection held for the duration of one store call.
///
/// Either borrowed from the host's ambient context, or checked out of the
/// store's own pool and returned to it when the lease is dropped, on every
/// exit path.
pub enum Lease<'a, DB: sqlx::Database> {
    Ambient(&'a mut DB::Connection),
    Pooled(PoolConnection<DB>),
}

impl<DB: sqlx::Database> Lease<'_, DB> {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient(_))
    }
}

impl<DB: sqlx::Database> Deref for Lease<'_, DB> {
    type Target = DB::Connection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Ambient(conn) => conn,
            Self::Pooled(conn) => conn,
        }
    }
}

impl<DB: sqlx::Database> DerefMut for Lease<'_, DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Ambient(conn) => conn,
            Self::Pooled(conn) => conn,
        }
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Db = sqlx::Postgres;

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(PostgresQueryBuilder)
        }

        fn build_create_table(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// PostgreSQL subscription store.
    pub type PostgresSubscriptionStore = super::SqlSubscriptionStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sea_query_binder::{SqlxBinder, SqlxValues};

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Db = sqlx::Sqlite;

        fn build_select(stmt: sea_query::SelectStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> (String, SqlxValues) {
            stmt.build_sqlx(SqliteQueryBuilder)
        }

        fn build_create_table(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// SQLite subscription store.
    pub type SqliteSubscriptionStore = super::SqlSubscriptionStore<Sqlite>;
}
