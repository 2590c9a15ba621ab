//! SQL database abstraction trait.

use sea_query::{DeleteStatement, InsertStatement, SelectStatement, TableCreateStatement};
use sea_query_binder::SqlxValues;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the sqlx driver type and the statement builders. DML is
/// built with bound parameters; only DDL is rendered to plain text.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The sqlx driver for this database.
    type Db: sqlx::Database;

    /// Build a parameterized SELECT.
    fn build_select(stmt: SelectStatement) -> (String, SqlxValues);

    /// Build a parameterized INSERT.
    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues);

    /// Build a parameterized DELETE.
    fn build_delete(stmt: DeleteStatement) -> (String, SqlxValues);

    /// Render a CREATE TABLE statement.
    fn build_create_table(stmt: TableCreateStatement) -> String;
}
