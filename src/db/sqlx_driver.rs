//! sqlx-backed implementation of the driver traits.
//!
//! [`SqlxDataSource`] opens one `AnyConnection` per `get_connection` call
//! (there is no pool) for SQLite, PostgreSQL or MySQL URLs. sqlx is async;
//! the adapter drives its futures on a private current-thread tokio runtime,
//! so every call blocks the calling thread. Do not call it from inside an
//! async context.
//!
//! Statements collect their bound values and are sent to sqlx when executed.
//! SQL is written with positional `?` placeholders; for PostgreSQL they are
//! rewritten to `$1, $2, ...` when the statement is prepared. A query cursor
//! streams rows from the connection one `advance` at a time; the first result
//! is pulled when the query is executed so that statement errors surface there.

use crate::db::driver::{Closeable, Connection, DataSource, PreparedStatement, ResultCursor};
use crate::db::row::Row;
use crate::db::types::{DatabaseType, decode_column};
use crate::db::value::SqlValue;
use crate::error::SqlError;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Column, Executor};
use std::borrow::Cow;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::timeout;
use tracing::{debug, info};

static INSTALL_DRIVERS: Once = Once::new();

/// Connection source over a database URL.
#[derive(Debug)]
pub struct SqlxDataSource {
    /// Contains sensitive data - never log
    connection_string: String,
    db_type: DatabaseType,
    connect_timeout: Option<Duration>,
    runtime: Arc<Runtime>,
}

impl SqlxDataSource {
    /// Create a source for `connection_string`. No connection is opened yet.
    pub fn new(connection_string: impl Into<String>) -> Result<Self, SqlError> {
        let connection_string = connection_string.into();
        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| SqlError::driver("Unknown database type in connection string"))?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SqlError::Runtime)?;

        info!(db_type = %db_type, "Data source created");

        Ok(Self {
            connection_string,
            db_type,
            connect_timeout: None,
            runtime: Arc::new(runtime),
        })
    }

    /// Fail `get_connection` when connecting takes longer than `connect_timeout`.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }
}

impl DataSource for SqlxDataSource {
    type Connection = SqlxConnection;

    fn get_connection(&self) -> Result<SqlxConnection, SqlError> {
        let connect = <AnyConnection as sqlx::Connection>::connect(&self.connection_string);
        let conn = match self.connect_timeout {
            Some(limit) => self
                .runtime
                .block_on(async { timeout(limit, connect).await })
                .map_err(|_| {
                    SqlError::driver(format!(
                        "Connection timed out after {}s",
                        limit.as_secs()
                    ))
                })??,
            None => self.runtime.block_on(connect)?,
        };

        debug!(db_type = %self.db_type, "Connection opened");
        Ok(SqlxConnection {
            conn,
            db_type: self.db_type,
            runtime: Arc::clone(&self.runtime),
            auto_commit: true,
            in_transaction: false,
        })
    }
}

/// A single sqlx connection.
pub struct SqlxConnection {
    conn: AnyConnection,
    db_type: DatabaseType,
    runtime: Arc<Runtime>,
    auto_commit: bool,
    in_transaction: bool,
}

impl SqlxConnection {
    fn execute_raw(&mut self, sql: &'static str) -> Result<(), SqlError> {
        self.runtime.block_on(self.conn.execute(sql))?;
        Ok(())
    }

    /// With auto-commit off, the transaction starts lazily on the first
    /// statement after `set_auto_commit(false)`, `commit` or `rollback`.
    fn begin_if_needed(&mut self) -> Result<(), SqlError> {
        if !self.auto_commit && !self.in_transaction {
            self.execute_raw("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Closeable for SqlxConnection {
    const KIND: &'static str = "connection";

    fn close(self) -> Result<(), SqlError> {
        let SqlxConnection { conn, runtime, .. } = self;
        runtime.block_on(sqlx::Connection::close(conn))?;
        Ok(())
    }
}

impl Connection for SqlxConnection {
    type Statement<'c>
        = SqlxStatement<'c>
    where
        Self: 'c;

    fn prepare_statement(&mut self, sql: &str) -> Result<SqlxStatement<'_>, SqlError> {
        let sql = match self.db_type {
            DatabaseType::PostgreSQL => numbered_placeholders(sql).into_owned(),
            DatabaseType::MySQL | DatabaseType::SQLite => sql.to_string(),
        };
        Ok(SqlxStatement {
            connection: self,
            sql,
            parameters: Vec::new(),
        })
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        // Switching auto-commit back on commits the open transaction.
        if auto_commit && self.in_transaction {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        if self.in_transaction {
            self.execute_raw("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.execute_raw("ROLLBACK")?;
        }
        Ok(())
    }
}

/// A statement with its bound values, executed on the borrowed connection.
pub struct SqlxStatement<'c> {
    connection: &'c mut SqlxConnection,
    sql: String,
    parameters: Vec<SqlValue>,
}

impl Closeable for SqlxStatement<'_> {
    const KIND: &'static str = "statement";

    fn close(self) -> Result<(), SqlError> {
        Ok(())
    }
}

impl PreparedStatement for SqlxStatement<'_> {
    type Cursor<'s>
        = SqlxCursor<'s>
    where
        Self: 's;

    fn set_parameter(&mut self, slot: usize, value: &SqlValue) -> Result<(), SqlError> {
        if slot == 0 {
            return Err(SqlError::InvalidParameterIndex(slot));
        }
        if self.parameters.len() < slot {
            self.parameters.resize(slot, SqlValue::Null);
        }
        self.parameters[slot - 1] = value.clone();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        self.connection.begin_if_needed()?;
        let query = build_query(&self.sql, &self.parameters);
        let conn = &mut *self.connection;
        let result = conn.runtime.block_on(query.execute(&mut conn.conn))?;
        Ok(result.rows_affected())
    }

    fn execute_query(&mut self) -> Result<SqlxCursor<'_>, SqlError> {
        self.connection.begin_if_needed()?;
        let SqlxStatement {
            connection,
            sql,
            parameters,
        } = self;
        let SqlxConnection { conn, runtime, .. } = &mut **connection;
        let runtime = Arc::clone(runtime);

        let mut rows = build_query(sql, parameters).fetch(conn);
        let first = runtime.block_on(rows.try_next())?;
        Ok(SqlxCursor {
            rows,
            runtime,
            first: Some(first),
            current: None,
            exhausted: false,
        })
    }
}

/// Rewrite `?` placeholders to `$1, $2, ...`.
///
/// Quoted strings and identifiers, `--` line comments and `/* */` block
/// comments are copied unchanged. Every other `?` is a placeholder, including
/// the PostgreSQL jsonb operators `?`, `?|` and `?&`; write those as
/// `jsonb_exists`, `jsonb_exists_any` and `jsonb_exists_all` calls instead.
fn numbered_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut slot = 0;
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\'' | '"' => {
                for q in chars.by_ref() {
                    out.push(q);
                    if q == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    out.push(n);
                    if n == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                // The opening '*' must not close the comment ("/*/").
                if let Some(star) = chars.next() {
                    out.push(star);
                }
                let mut prev = '\0';
                for n in chars.by_ref() {
                    out.push(n);
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            '?' => {
                out.pop();
                slot += 1;
                out.push('$');
                out.push_str(&slot.to_string());
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn build_query<'q>(sql: &'q str, parameters: &[SqlValue]) -> Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in parameters {
        query = bind_param(query, param);
    }
    query
}

fn bind_param<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    param: &SqlValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
    }
}

/// Forward-only cursor streaming rows from the statement's connection.
pub struct SqlxCursor<'s> {
    rows: BoxStream<'s, Result<AnyRow, sqlx::Error>>,
    runtime: Arc<Runtime>,
    /// Result pulled by `execute_query`, handed out by the first `advance`.
    first: Option<Option<AnyRow>>,
    current: Option<AnyRow>,
    exhausted: bool,
}

impl SqlxCursor<'_> {
    fn current(&self) -> Result<&AnyRow, SqlError> {
        self.current.as_ref().ok_or(SqlError::NoCurrentRow)
    }
}

impl Row for SqlxCursor<'_> {
    fn column_count(&self) -> usize {
        self.current
            .as_ref()
            .map_or(0, |row| sqlx::Row::columns(row).len())
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        let row = self.current.as_ref()?;
        sqlx::Row::columns(row).get(index).map(|col| col.name())
    }

    fn value_at(&self, index: usize) -> Result<SqlValue, SqlError> {
        let row = self.current()?;
        let len = sqlx::Row::columns(row).len();
        if index >= len {
            return Err(SqlError::ColumnIndexOutOfBounds { index, len });
        }
        decode_column(row, index)
    }
}

impl ResultCursor for SqlxCursor<'_> {
    fn advance(&mut self) -> Result<bool, SqlError> {
        self.current = None;
        if self.exhausted {
            return Ok(false);
        }
        let next = match self.first.take() {
            Some(first) => first,
            None => self.runtime.block_on(self.rows.try_next())?,
        };
        self.exhausted = next.is_none();
        self.current = next;
        Ok(self.current.is_some())
    }
}

impl Closeable for SqlxCursor<'_> {
    const KIND: &'static str = "cursor";

    fn close(self) -> Result<(), SqlError> {
        Ok(())
    }
}
