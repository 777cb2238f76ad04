//! Owned result rows.

use super::{DbError, DbResult, Value};
use rusqlite::types::{FromSql, FromSqlError, ValueRef};
use std::sync::Arc;

/// One result row detached from its statement.
///
/// Column names are shared between all rows of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of `column`, matched exactly first and then ignoring ASCII case.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| name == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|name| name.eq_ignore_ascii_case(column))
            })
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    /// Reads and converts a column by name.
    ///
    /// # Errors
    /// - `InvalidColumnName` when the row has no such column.
    /// - Conversion errors when the stored value does not fit `T`.
    pub fn get<T: FromSql>(&self, column: &str) -> DbResult<T> {
        let idx = self.index_of(column).ok_or_else(|| {
            DbError::Sqlite(rusqlite::Error::InvalidColumnName(column.to_string()))
        })?;
        self.get_index(idx)
    }

    pub fn get_index<T: FromSql>(&self, idx: usize) -> DbResult<T> {
        let value = self
            .values
            .get(idx)
            .ok_or(DbError::Sqlite(rusqlite::Error::InvalidColumnIndex(idx)))?;

        T::column_result(ValueRef::from(value)).map_err(|err| {
            let name = self.columns[idx].clone();
            let err = match err {
                FromSqlError::InvalidType => {
                    rusqlite::Error::InvalidColumnType(idx, name, value.data_type())
                }
                FromSqlError::OutOfRange(raw) => rusqlite::Error::IntegralValueOutOfRange(idx, raw),
                other => {
                    rusqlite::Error::FromSqlConversionFailure(idx, value.data_type(), Box::new(other))
                }
            };
            DbError::Sqlite(err)
        })
    }
}
