//! Database access layer.
//!
//! This module provides the template-style data access helper:
//! - Driver traits (connection source, connection, statement, cursor, row)
//! - Positional parameter binding
//! - Query execution with row mapping and guaranteed resource release
//! - Transaction resource registry for pinning a connection to a transaction
//! - A sqlx-backed driver for SQLite, PostgreSQL and MySQL

pub mod driver;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod row;
pub mod sqlx_driver;
pub mod transaction_registry;
pub mod types;
pub mod value;

pub use driver::{
    Closeable, Connection, DataSource, PreparedStatement, ResourceGuard, ResultCursor,
};
pub use executor::JdbcTemplate;
pub use params::bind_parameters;
pub use row::{ColumnIndex, FromRow, Row};
pub use sqlx_driver::{SqlxConnection, SqlxCursor, SqlxDataSource, SqlxStatement};
pub use transaction_registry::{ResourceKey, TransactionResources};
pub use types::DatabaseType;
pub use value::{FromSqlValue, SqlValue};
