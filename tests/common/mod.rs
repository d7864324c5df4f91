//! Recording driver shared by the integration tests.
//!
//! Every driver call is appended to an event log so tests can assert on the
//! exact order of acquire, bind, execute and release calls. Individual calls
//! can be made to fail.

#![allow(dead_code)]

use db_template::db::{
    Closeable, Connection, DataSource, PreparedStatement, ResultCursor, Row, SqlValue,
};
use db_template::error::SqlError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    GetConnection(u32),
    Prepare(String),
    SetParameter(usize, SqlValue),
    ExecuteUpdate,
    ExecuteQuery,
    Advance,
    CloseCursor,
    CloseStatement,
    CloseConnection(u32),
    SetAutoCommit(u32, bool),
    Commit(u32),
    Rollback(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    GetConnection,
    Prepare,
    SetParameter,
    ExecuteUpdate,
    ExecuteQuery,
    Advance,
    CloseCursor,
    CloseStatement,
    CloseConnection,
    SetAutoCommit,
    Commit,
    Rollback,
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    failures: Mutex<HashSet<FailPoint>>,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    rows_affected: u64,
    next_id: AtomicU32,
}

impl Shared {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn check(&self, point: FailPoint) -> Result<(), SqlError> {
        if self.failures.lock().unwrap().contains(&point) {
            Err(SqlError::driver(format!("injected {point:?} failure")))
        } else {
            Ok(())
        }
    }
}

/// Connection source returning canned rows.
pub struct MockDataSource {
    shared: Arc<Shared>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::with_rows(&[], Vec::new())
    }

    /// Every query returns `rows` under `columns`.
    pub fn with_rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
                ..Shared::default()
            }),
        }
    }

    /// Every update reports `rows_affected`.
    pub fn with_rows_affected(rows_affected: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                rows_affected,
                ..Shared::default()
            }),
        }
    }

    pub fn fail_at(&self, point: FailPoint) {
        self.shared.failures.lock().unwrap().insert(point);
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.shared.events.lock().unwrap().clear();
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    /// Release events only, in the order they happened.
    pub fn closes(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::CloseCursor | Event::CloseStatement | Event::CloseConnection(_)
                )
            })
            .collect()
    }
}

impl DataSource for MockDataSource {
    type Connection = MockConnection;

    fn get_connection(&self) -> Result<MockConnection, SqlError> {
        self.shared.check(FailPoint::GetConnection)?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.record(Event::GetConnection(id));
        Ok(MockConnection {
            id,
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct MockConnection {
    id: u32,
    shared: Arc<Shared>,
}

impl MockConnection {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Closeable for MockConnection {
    const KIND: &'static str = "connection";

    fn close(self) -> Result<(), SqlError> {
        self.shared.record(Event::CloseConnection(self.id));
        self.shared.check(FailPoint::CloseConnection)
    }
}

impl Connection for MockConnection {
    type Statement<'c>
        = MockStatement<'c>
    where
        Self: 'c;

    fn prepare_statement(&mut self, sql: &str) -> Result<MockStatement<'_>, SqlError> {
        self.shared.record(Event::Prepare(sql.to_string()));
        self.shared.check(FailPoint::Prepare)?;
        Ok(MockStatement { connection: self })
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<(), SqlError> {
        self.shared
            .record(Event::SetAutoCommit(self.id, auto_commit));
        self.shared.check(FailPoint::SetAutoCommit)
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.shared.record(Event::Commit(self.id));
        self.shared.check(FailPoint::Commit)
    }

    fn rollback(&mut self) -> Result<(), SqlError> {
        self.shared.record(Event::Rollback(self.id));
        self.shared.check(FailPoint::Rollback)
    }
}

pub struct MockStatement<'c> {
    connection: &'c mut MockConnection,
}

impl Closeable for MockStatement<'_> {
    const KIND: &'static str = "statement";

    fn close(self) -> Result<(), SqlError> {
        self.connection.shared.record(Event::CloseStatement);
        self.connection.shared.check(FailPoint::CloseStatement)
    }
}

impl PreparedStatement for MockStatement<'_> {
    type Cursor<'s>
        = MockCursor
    where
        Self: 's;

    fn set_parameter(&mut self, slot: usize, value: &SqlValue) -> Result<(), SqlError> {
        let shared = &self.connection.shared;
        shared.record(Event::SetParameter(slot, value.clone()));
        shared.check(FailPoint::SetParameter)
    }

    fn execute_update(&mut self) -> Result<u64, SqlError> {
        let shared = &self.connection.shared;
        shared.record(Event::ExecuteUpdate);
        shared.check(FailPoint::ExecuteUpdate)?;
        Ok(shared.rows_affected)
    }

    fn execute_query(&mut self) -> Result<MockCursor, SqlError> {
        let shared = &self.connection.shared;
        shared.record(Event::ExecuteQuery);
        shared.check(FailPoint::ExecuteQuery)?;
        Ok(MockCursor {
            shared: Arc::clone(shared),
            position: None,
        })
    }
}

pub struct MockCursor {
    shared: Arc<Shared>,
    position: Option<usize>,
}

impl Row for MockCursor {
    fn column_count(&self) -> usize {
        self.shared.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.shared.columns.get(index).map(String::as_str)
    }

    fn value_at(&self, index: usize) -> Result<SqlValue, SqlError> {
        let row = self
            .position
            .and_then(|p| self.shared.rows.get(p))
            .ok_or(SqlError::NoCurrentRow)?;
        row.get(index)
            .cloned()
            .ok_or(SqlError::ColumnIndexOutOfBounds {
                index,
                len: row.len(),
            })
    }
}

impl ResultCursor for MockCursor {
    fn advance(&mut self) -> Result<bool, SqlError> {
        self.shared.record(Event::Advance);
        self.shared.check(FailPoint::Advance)?;
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next);
        Ok(next < self.shared.rows.len())
    }
}

impl Closeable for MockCursor {
    const KIND: &'static str = "cursor";

    fn close(self) -> Result<(), SqlError> {
        self.shared.record(Event::CloseCursor);
        self.shared.check(FailPoint::CloseCursor)
    }
}

/// Rows of the `users` table used throughout the tests.
pub fn users_source() -> MockDataSource {
    MockDataSource::with_rows(
        &["id", "account", "password", "email"],
        vec![
            vec![
                SqlValue::Int(1),
                SqlValue::from("jojo"),
                SqlValue::from("1234"),
                SqlValue::Null,
            ],
            vec![
                SqlValue::Int(2),
                SqlValue::from("cutehuman"),
                SqlValue::from("5678"),
                SqlValue::from("cute@example.com"),
            ],
        ],
    )
}
