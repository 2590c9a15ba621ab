//! Unified SQL SubscriptionStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use tracing::trace;

use super::{Lease, SqlDatabase};
use crate::config::RegistryConfig;
use crate::storage::schema::TableName;
use crate::storage::{AmbientConnection, ConnectionTarget, Result};

type ConnectionOf<DB> = <<DB as SqlDatabase>::Db as sqlx::Database>::Connection;

/// SQL-based implementation of SubscriptionStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlSubscriptionStore<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Db>,
    table: TableName,
    target: Option<ConnectionTarget>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlSubscriptionStore<DB> {
    /// Create a store over `pool` using `table`.
    ///
    /// Without a configured target, any open ambient connection is reused.
    pub fn new(pool: sqlx::Pool<DB::Db>, table: TableName) -> Self {
        Self {
            pool,
            table,
            target: None,
            _marker: PhantomData,
        }
    }

    /// Create a store from registry configuration.
    pub fn from_config(pool: sqlx::Pool<DB::Db>, config: &RegistryConfig) -> Self {
        let store = Self::new(pool, config.table_name.clone());
        match config.connection_string.as_deref() {
            Some(cs) => store.with_target(ConnectionTarget::parse(cs)),
            None => store,
        }
    }

    /// Only reuse ambient connections pointing at `target`.
    pub fn with_target(mut self, target: ConnectionTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &sqlx::Pool<DB::Db> {
        &self.pool
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn target(&self) -> Option<&ConnectionTarget> {
        self.target.as_ref()
    }

    /// Pick the connection for one call: the ambient one when it is open and
    /// targets this store's database, otherwise one from the pool.
    async fn lease<'a>(
        &self,
        ambient: Option<&'a mut AmbientConnection<'_, ConnectionOf<DB>>>,
    ) -> Result<Lease<'a, DB::Db>> {
        if let Some(conn) = ambient.and_then(|a| a.reusable_for(self.target.as_ref())) {
            trace!(table = %self.table, "reusing ambient connection");
            return Ok(Lease::Ambient(conn));
        }
        Ok(Lease::Pooled(self.pool.acquire().await?))
    }
}

/// Macro to implement SubscriptionStore for a specific SQL backend.
///
/// This eliminates duplication between PostgreSQL and SQLite implementations
/// while maintaining full type safety.
macro_rules! impl_subscription_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::SubscriptionStore for SqlSubscriptionStore<$db_type> {
            type Connection = ConnectionOf<$db_type>;

            async fn create_schema(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
            ) -> crate::storage::Result<()> {
                let sql = <$db_type>::build_create_table(crate::storage::schema::create_table(
                    &self.table,
                ));

                let mut conn = self.lease(ambient).await?;
                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            }

            async fn load_live(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
                publisher: &str,
                now: chrono::DateTime<chrono::Utc>,
            ) -> crate::storage::Result<Vec<(String, String)>> {
                use sea_query::{Cond, Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::Subscriptions;

                let now = crate::subscription::encode_timestamp(now);
                let stmt = Query::select()
                    .columns([Subscriptions::MessageType, Subscriptions::SubscriberEndpoint])
                    .from(self.table.iden())
                    .cond_where(
                        Cond::all()
                            .add(Expr::col(Subscriptions::PublisherEndpoint).eq(publisher))
                            .add(
                                Cond::any()
                                    .add(Expr::col(Subscriptions::ExpirationDate).is_null())
                                    .add(Expr::col(Subscriptions::ExpirationDate).gte(now)),
                            ),
                    )
                    .to_owned();

                let (sql, values) = <$db_type>::build_select(stmt);
                let mut conn = self.lease(ambient).await?;
                let rows = sqlx::query_with(&sql, values).fetch_all(&mut *conn).await?;

                rows.iter()
                    .map(|row| -> crate::storage::Result<(String, String)> {
                        Ok((
                            row.try_get::<String, _>("message_type")?,
                            row.try_get::<String, _>("subscriber_endpoint")?,
                        ))
                    })
                    .collect()
            }

            async fn list(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
                publisher: &str,
            ) -> crate::storage::Result<Vec<crate::subscription::Subscription>> {
                use sea_query::{Expr, Order, Query};
                use sqlx::Row;

                use crate::storage::schema::Subscriptions;
                use crate::subscription::{decode_timestamp, Subscription};

                let stmt = Query::select()
                    .columns([
                        Subscriptions::PublisherEndpoint,
                        Subscriptions::SubscriberEndpoint,
                        Subscriptions::MessageType,
                        Subscriptions::CreatedDate,
                        Subscriptions::ExpirationDate,
                    ])
                    .from(self.table.iden())
                    .and_where(Expr::col(Subscriptions::PublisherEndpoint).eq(publisher))
                    .order_by(Subscriptions::MessageType, Order::Asc)
                    .order_by(Subscriptions::SubscriberEndpoint, Order::Asc)
                    .to_owned();

                let (sql, values) = <$db_type>::build_select(stmt);
                let mut conn = self.lease(ambient).await?;
                let rows = sqlx::query_with(&sql, values).fetch_all(&mut *conn).await?;

                rows.iter()
                    .map(|row| -> crate::storage::Result<Subscription> {
                        let created: String = row.try_get("created_date")?;
                        let expires: Option<String> = row.try_get("expiration_date")?;
                        Ok(Subscription {
                            publisher_endpoint: row.try_get("publisher_endpoint")?,
                            subscriber_endpoint: row.try_get("subscriber_endpoint")?,
                            message_type: row.try_get("message_type")?,
                            created_at: decode_timestamp(&created)?,
                            expires_at: expires.as_deref().map(decode_timestamp).transpose()?,
                        })
                    })
                    .collect()
            }

            async fn upsert(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
                subscription: &crate::subscription::Subscription,
            ) -> crate::storage::Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::Subscriptions;
                use crate::subscription::encode_timestamp;

                let stmt = Query::insert()
                    .into_table(self.table.iden())
                    .columns([
                        Subscriptions::PublisherEndpoint,
                        Subscriptions::SubscriberEndpoint,
                        Subscriptions::MessageType,
                        Subscriptions::CreatedDate,
                        Subscriptions::ExpirationDate,
                    ])
                    .values_panic([
                        subscription.publisher_endpoint.as_str().into(),
                        subscription.subscriber_endpoint.as_str().into(),
                        subscription.message_type.as_str().into(),
                        encode_timestamp(subscription.created_at).into(),
                        subscription.expires_at.map(encode_timestamp).into(),
                    ])
                    .on_conflict(
                        OnConflict::columns([
                            Subscriptions::PublisherEndpoint,
                            Subscriptions::SubscriberEndpoint,
                            Subscriptions::MessageType,
                        ])
                        .update_column(Subscriptions::ExpirationDate)
                        .to_owned(),
                    )
                    .to_owned();

                let (sql, values) = <$db_type>::build_insert(stmt);
                let mut conn = self.lease(ambient).await?;
                sqlx::query_with(&sql, values).execute(&mut *conn).await?;

                Ok(())
            }

            async fn delete(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
                publisher: &str,
                subscriber: &str,
                message_type: &str,
            ) -> crate::storage::Result<u64> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Subscriptions;

                let stmt = Query::delete()
                    .from_table(self.table.iden())
                    .and_where(Expr::col(Subscriptions::PublisherEndpoint).eq(publisher))
                    .and_where(Expr::col(Subscriptions::SubscriberEndpoint).eq(subscriber))
                    .and_where(Expr::col(Subscriptions::MessageType).eq(message_type))
                    .to_owned();

                let (sql, values) = <$db_type>::build_delete(stmt);
                let mut conn = self.lease(ambient).await?;
                let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;

                Ok(result.rows_affected())
            }

            async fn delete_expired(
                &self,
                ambient: crate::storage::Ambient<'_, '_, Self::Connection>,
                publisher: &str,
                subscriber: &str,
                message_type: &str,
                now: chrono::DateTime<chrono::Utc>,
            ) -> crate::storage::Result<u64> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::Subscriptions;

                let now = crate::subscription::encode_timestamp(now);
                let stmt = Query::delete()
                    .from_table(self.table.iden())
                    .and_where(Expr::col(Subscriptions::PublisherEndpoint).eq(publisher))
                    .and_where(Expr::col(Subscriptions::SubscriberEndpoint).eq(subscriber))
                    .and_where(Expr::col(Subscriptions::MessageType).eq(message_type))
                    .and_where(Expr::col(Subscriptions::ExpirationDate).is_not_null())
                    .and_where(Expr::col(Subscriptions::ExpirationDate).lte(now))
                    .to_owned();

                let (sql, values) = <$db_type>::build_delete(stmt);
                let mut conn = self.lease(ambient).await?;
                let result = sqlx::query_with(&sql, values).execute(&mut *conn).await?;

                Ok(result.rows_affected())
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_subscription_store!(super::postgres::Postgres, "postgres");
impl_subscription_store!(super::sqlite::Sqlite, "sqlite");
