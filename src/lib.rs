//! DB Template Library
//!
//! A template-style data access helper: it acquires connections, binds
//! positional parameters, maps result rows through caller-supplied mappers,
//! releases every resource it acquired, and translates driver failures into
//! a single [`DataAccessError`]. Connections can be pinned to a transaction
//! through [`TransactionResources`](db::TransactionResources).

pub mod config;
pub mod db;
pub mod error;

pub use config::Config;
pub use db::JdbcTemplate;
pub use error::{DataAccessError, DataAccessResult, SqlError};
