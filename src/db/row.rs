//! Row access and the row mapper contract.
//!
//! A row mapper is any `FnMut(&dyn Row) -> Result<T, SqlError>`. It is
//! handed the cursor at its current position and reads columns either by
//! position or by name:
//!
//! ```ignore
//! let user = |row: &dyn Row| {
//!     Ok(User {
//!         id: row.get(0)?,
//!         account: row.get("account")?,
//!     })
//! };
//! ```

use crate::db::value::{FromSqlValue, SqlValue};
use crate::error::SqlError;

/// Column access for the row a cursor is positioned on.
///
/// Column positions are 0-based.
pub trait Row {
    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Option<&str>;

    fn value_at(&self, index: usize) -> Result<SqlValue, SqlError>;

    /// Resolve a column name (case-insensitive) to its position.
    fn column_index(&self, name: &str) -> Result<usize, SqlError> {
        (0..self.column_count())
            .find(|&i| {
                self.column_name(i)
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| SqlError::ColumnNotFound(name.to_string()))
    }
}

/// Something that identifies a column: a position or a name.
pub trait ColumnIndex {
    fn resolve(&self, row: &dyn Row) -> Result<usize, SqlError>;
}

impl ColumnIndex for usize {
    fn resolve(&self, row: &dyn Row) -> Result<usize, SqlError> {
        let len = row.column_count();
        if *self < len {
            Ok(*self)
        } else {
            Err(SqlError::ColumnIndexOutOfBounds { index: *self, len })
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, row: &dyn Row) -> Result<usize, SqlError> {
        row.column_index(self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, row: &dyn Row) -> Result<usize, SqlError> {
        row.column_index(self)
    }
}

impl dyn Row + '_ {
    /// Read a column and convert it.
    pub fn get<T: FromSqlValue>(&self, column: impl ColumnIndex) -> Result<T, SqlError> {
        T::from_sql_value(self.get_value(column)?)
    }

    /// Read a column as an untyped value.
    pub fn get_value(&self, column: impl ColumnIndex) -> Result<SqlValue, SqlError> {
        let index = column.resolve(self)?;
        self.value_at(index)
    }

    /// Column names in position order.
    pub fn column_names(&self) -> Vec<String> {
        (0..self.column_count())
            .map(|i| self.column_name(i).unwrap_or_default().to_string())
            .collect()
    }
}

/// A type that knows how to build itself from a row.
///
/// `T::from_row` can be passed anywhere a row mapper is expected.
pub trait FromRow: Sized {
    fn from_row(row: &dyn Row) -> Result<Self, SqlError>;
}

impl FromRow for SqlValue {
    fn from_row(row: &dyn Row) -> Result<Self, SqlError> {
        row.get_value(0)
    }
}

impl FromRow for Vec<SqlValue> {
    fn from_row(row: &dyn Row) -> Result<Self, SqlError> {
        (0..row.column_count()).map(|i| row.value_at(i)).collect()
    }
}
