//! Driver abstraction the template executes against.
//!
//! The traits mirror the life cycle of a database call:
//! [`DataSource`] → [`Connection`] → [`PreparedStatement`] → [`ResultCursor`].
//! Each inner handle borrows the outer one mutably, so a statement cannot
//! outlive its connection and a cursor cannot outlive its statement.
//!
//! Every handle is [`Closeable`]. `close` consumes the handle, so a handle is
//! released at most once; [`ResourceGuard`] makes sure it is released at least
//! once, on every exit path.

use crate::db::row::Row;
use crate::db::value::SqlValue;
use crate::error::{DataAccessError, DataAccessResult, Operation, SqlError};
use std::sync::Arc;
use tracing::{trace, warn};

/// A handle that must be released exactly once.
pub trait Closeable: Sized {
    /// Short name used in log events ("connection", "statement", ...).
    const KIND: &'static str;

    fn close(self) -> Result<(), SqlError>;
}

/// Factory yielding live connections on demand.
///
/// Implementations are owned by the application and may be shared between
/// threads; `get_connection` must be safe to call concurrently.
pub trait DataSource {
    type Connection: Connection;

    fn get_connection(&self) -> Result<Self::Connection, SqlError>;
}

impl<S: DataSource> DataSource for Arc<S> {
    type Connection = S::Connection;

    fn get_connection(&self) -> Result<Self::Connection, SqlError> {
        (**self).get_connection()
    }
}

/// A live, stateful database connection.
pub trait Connection: Closeable {
    type Statement<'c>: PreparedStatement
    where
        Self: 'c;

    /// Prepare `sql`, which uses positional `?` placeholders.
    fn prepare_statement(&mut self, sql: &str) -> Result<Self::Statement<'_>, SqlError>;

    /// With auto-commit off, statements run inside a transaction that stays
    /// open until `commit` or `rollback`.
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError>;

    fn commit(&mut self) -> Result<(), SqlError>;

    fn rollback(&mut self) -> Result<(), SqlError>;
}

/// A parameterized statement with slots `1..=N`.
pub trait PreparedStatement: Closeable {
    type Cursor<'s>: ResultCursor
    where
        Self: 's;

    /// Bind `value` to `slot` (1-based). The driver chooses the SQL type
    /// from the value's variant.
    fn set_parameter(&mut self, slot: usize, value: &SqlValue) -> Result<(), SqlError>;

    /// Execute as a mutation and return the affected row count.
    fn execute_update(&mut self) -> Result<u64, SqlError>;

    fn execute_query(&mut self) -> Result<Self::Cursor<'_>, SqlError>;
}

/// Forward-only cursor over query results.
///
/// Before the first successful [`advance`](ResultCursor::advance) the cursor
/// is not positioned on any row; column access then fails with
/// [`SqlError::NoCurrentRow`].
pub trait ResultCursor: Row + Closeable {
    /// Move to the next row. Returns `false` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool, SqlError>;
}

/// Owns a [`Closeable`] handle and releases it when dropped.
///
/// The success path calls [`release`](ResourceGuard::release) so that a
/// failing close is reported to the caller. On early return the guard is
/// dropped instead: locals drop in reverse declaration order, which gives
/// cursor → statement → connection, and a close failure at that point is only
/// logged so the failure already propagating wins.
pub struct ResourceGuard<R: Closeable> {
    resource: Option<R>,
}

impl<R: Closeable> ResourceGuard<R> {
    pub fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        match self.resource.as_mut() {
            Some(resource) => resource,
            // `resource` is only taken by `release` (which consumes the guard)
            // and by `drop`.
            None => unreachable!("resource guard used after release"),
        }
    }

    /// Take the handle out without closing it.
    pub fn into_inner(mut self) -> R {
        match self.resource.take() {
            Some(resource) => resource,
            None => unreachable!("resource guard used after release"),
        }
    }

    /// Release the handle, translating a close failure.
    pub fn release(mut self) -> DataAccessResult<()> {
        match self.resource.take() {
            Some(resource) => {
                trace!(resource = R::KIND, "Releasing");
                resource
                    .close()
                    .map_err(DataAccessError::at(Operation::Close))
            }
            None => Ok(()),
        }
    }
}

impl<R: Closeable> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            trace!(resource = R::KIND, "Releasing after failure");
            if let Err(e) = resource.close() {
                warn!(resource = R::KIND, error = %e, "Failed to close resource during cleanup");
            }
        }
    }
}
