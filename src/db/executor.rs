//! Query execution engine.
//!
//! [`JdbcTemplate`] runs one SQL statement per call:
//! - acquire a connection (or use the one pinned in a [`TransactionResources`])
//! - prepare the statement and bind parameters to slots `1..=N`
//! - execute, and for queries map rows through the caller's row mapper
//! - release cursor, statement and fresh connection, in that order
//!
//! Every driver failure comes back as a [`DataAccessError`] wrapping the
//! original cause. Release happens on every exit path; see
//! [`ResourceGuard`] for how cleanup failures are treated.

use crate::db::driver::{Connection, DataSource, PreparedStatement, ResourceGuard, ResultCursor};
use crate::db::params::bind_parameters;
use crate::db::row::Row;
use crate::db::transaction_registry::{ResourceKey, TransactionResources};
use crate::db::value::SqlValue;
use crate::error::{DataAccessError, DataAccessResult, Operation, SqlError};
use std::sync::Arc;
use tracing::{debug, trace};

/// Data access executor over a connection source.
pub struct JdbcTemplate<S> {
    data_source: Arc<S>,
}

impl<S> Clone for JdbcTemplate<S> {
    fn clone(&self) -> Self {
        Self {
            data_source: Arc::clone(&self.data_source),
        }
    }
}

impl<S: DataSource> JdbcTemplate<S> {
    pub fn new(data_source: Arc<S>) -> Self {
        Self { data_source }
    }

    pub fn data_source(&self) -> &Arc<S> {
        &self.data_source
    }

    /// Key under which this template's connections are pinned.
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::of(&self.data_source)
    }

    /// Execute a mutation (INSERT, UPDATE, DELETE, DDL) and return the
    /// affected row count.
    pub fn execute_update(&self, sql: &str, params: &[SqlValue]) -> DataAccessResult<u64> {
        self.with_connection(None, |conn| update(conn, sql, params))
    }

    /// Run a query and map its first row, if any. Further rows are not read.
    pub fn execute_query_single<T, F>(
        &self,
        sql: &str,
        mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Option<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        self.query_single_with(None, sql, mapper, params)
    }

    /// Run a query and map every row, in cursor order.
    pub fn execute_query_multi<T, F>(
        &self,
        sql: &str,
        mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Vec<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        self.query_multi_with(None, sql, mapper, params)
    }

    /// [`execute_update`](Self::execute_update) on the connection pinned in
    /// `resources`, falling back to a fresh one when none is bound.
    pub fn execute_update_in(
        &self,
        resources: &mut TransactionResources<S::Connection>,
        sql: &str,
        params: &[SqlValue],
    ) -> DataAccessResult<u64> {
        self.with_connection(Some(resources), |conn| update(conn, sql, params))
    }

    pub fn execute_query_single_in<T, F>(
        &self,
        resources: &mut TransactionResources<S::Connection>,
        sql: &str,
        mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Option<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        self.query_single_with(Some(resources), sql, mapper, params)
    }

    pub fn execute_query_multi_in<T, F>(
        &self,
        resources: &mut TransactionResources<S::Connection>,
        sql: &str,
        mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Vec<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        self.query_multi_with(Some(resources), sql, mapper, params)
    }

    fn query_single_with<T, F>(
        &self,
        resources: Option<&mut TransactionResources<S::Connection>>,
        sql: &str,
        mut mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Option<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        let rows = self.with_connection(resources, |conn| {
            query(conn, sql, params, &mut mapper, RowLimit::First)
        })?;
        Ok(rows.into_iter().next())
    }

    fn query_multi_with<T, F>(
        &self,
        resources: Option<&mut TransactionResources<S::Connection>>,
        sql: &str,
        mut mapper: F,
        params: &[SqlValue],
    ) -> DataAccessResult<Vec<T>>
    where
        F: FnMut(&dyn Row) -> Result<T, SqlError>,
    {
        self.with_connection(resources, |conn| {
            query(conn, sql, params, &mut mapper, RowLimit::All)
        })
    }

    /// Run `op` on the pinned connection if `resources` holds one for this
    /// source; otherwise on a fresh connection that is closed afterwards.
    fn with_connection<T>(
        &self,
        resources: Option<&mut TransactionResources<S::Connection>>,
        op: impl FnOnce(&mut S::Connection) -> DataAccessResult<T>,
    ) -> DataAccessResult<T> {
        let key = self.resource_key();
        if let Some(pinned) = resources.and_then(|r| r.get_resource_mut(key)) {
            trace!(key = %key, "Using transaction-bound connection");
            return op(pinned);
        }

        let mut connection = ResourceGuard::new(
            self.data_source
                .get_connection()
                .map_err(DataAccessError::at(Operation::GetConnection))?,
        );
        let value = op(connection.get_mut())?;
        connection.release()?;
        Ok(value)
    }
}

impl<S> std::fmt::Debug for JdbcTemplate<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdbcTemplate")
            .field("data_source", &ResourceKey::of(&self.data_source))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLimit {
    /// Advance once and stop.
    First,
    All,
}

fn update<C: Connection>(conn: &mut C, sql: &str, params: &[SqlValue]) -> DataAccessResult<u64> {
    debug!(sql = %sql, params = params.len(), "Executing update");

    let mut statement = ResourceGuard::new(
        conn.prepare_statement(sql)
            .map_err(DataAccessError::at(Operation::PrepareStatement))?,
    );
    bind_parameters(statement.get_mut(), params)?;
    let rows_affected = statement
        .get_mut()
        .execute_update()
        .map_err(DataAccessError::at(Operation::ExecuteUpdate))?;
    statement.release()?;

    debug!(rows_affected, "Update complete");
    Ok(rows_affected)
}

fn query<C, T, F>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
    mapper: &mut F,
    limit: RowLimit,
) -> DataAccessResult<Vec<T>>
where
    C: Connection,
    F: FnMut(&dyn Row) -> Result<T, SqlError>,
{
    debug!(sql = %sql, params = params.len(), ?limit, "Executing query");

    let mut statement = ResourceGuard::new(
        conn.prepare_statement(sql)
            .map_err(DataAccessError::at(Operation::PrepareStatement))?,
    );
    bind_parameters(statement.get_mut(), params)?;
    let mut cursor = ResourceGuard::new(
        statement
            .get_mut()
            .execute_query()
            .map_err(DataAccessError::at(Operation::ExecuteQuery))?,
    );
    let rows = map_rows(cursor.get_mut(), mapper, limit)?;
    cursor.release()?;
    statement.release()?;

    debug!(rows = rows.len(), "Query complete");
    Ok(rows)
}

fn map_rows<K, T, F>(cursor: &mut K, mapper: &mut F, limit: RowLimit) -> DataAccessResult<Vec<T>>
where
    K: ResultCursor,
    F: FnMut(&dyn Row) -> Result<T, SqlError>,
{
    let mut rows = Vec::new();
    while cursor
        .advance()
        .map_err(DataAccessError::at(Operation::AdvanceCursor))?
    {
        let row = mapper(&*cursor).map_err(DataAccessError::at(Operation::MapRow))?;
        rows.push(row);
        if limit == RowLimit::First {
            break;
        }
    }
    Ok(rows)
}
