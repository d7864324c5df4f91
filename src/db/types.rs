//! Database-agnostic type mappings.
//!
//! Column values coming back from sqlx are classified by their runtime type
//! name into a [`TypeCategory`], then decoded into a [`SqlValue`].

use crate::db::value::SqlValue;
use crate::error::SqlError;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::{Row, TypeInfo, ValueRef};
use std::fmt;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Null,
    Integer,
    Float,
    Boolean,
    Text,
    Binary,
    Unknown,
}

/// Classify a type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower == "null" {
        return TypeCategory::Null;
    }

    // Integer types, matched by name: INTERVAL and POINT also contain "int".
    let base = lower.strip_suffix(" unsigned").unwrap_or(&lower);
    if matches!(
        base,
        "int"
            | "integer"
            | "int2"
            | "int4"
            | "int8"
            | "tinyint"
            | "smallint"
            | "mediumint"
            | "bigint"
            | "smallserial"
            | "serial"
            | "bigserial"
    ) {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Decode column `idx` of `row` into a [`SqlValue`].
pub fn decode_column(row: &AnyRow, idx: usize) -> Result<SqlValue, SqlError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    match categorize_type(&type_name) {
        TypeCategory::Null => Ok(SqlValue::Null),
        TypeCategory::Integer => decode_integer(row, idx, &type_name),
        TypeCategory::Float => decode_float(row, idx, &type_name),
        TypeCategory::Boolean => Ok(row
            .try_get::<Option<bool>, _>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bool)),
        TypeCategory::Binary => Ok(row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bytes)),
        TypeCategory::Text => Ok(row
            .try_get::<Option<String>, _>(idx)?
            .map_or(SqlValue::Null, SqlValue::String)),
        TypeCategory::Unknown => decode_fallback(row, idx, type_name),
    }
}

fn decode_integer(row: &AnyRow, idx: usize, type_name: &str) -> Result<SqlValue, SqlError> {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(SqlValue::Int(v));
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return Ok(SqlValue::Int(v.into()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return Ok(SqlValue::Int(v.into()));
    }
    decode_fallback(row, idx, type_name.to_string())
}

fn decode_float(row: &AnyRow, idx: usize, type_name: &str) -> Result<SqlValue, SqlError> {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(SqlValue::Float(v));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return Ok(SqlValue::Float(v.into()));
    }
    Err(SqlError::UnsupportedType {
        index: idx,
        type_name: type_name.to_string(),
    })
}

fn decode_fallback(row: &AnyRow, idx: usize, type_name: String) -> Result<SqlValue, SqlError> {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return Ok(SqlValue::String(v));
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Ok(SqlValue::Bytes(v));
    }
    Err(SqlError::UnsupportedType {
        index: idx,
        type_name,
    })
}
