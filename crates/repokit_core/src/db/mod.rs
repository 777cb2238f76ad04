//! Connection client, statement execution and schema migration entry points.
//!
//! # Responsibility
//! - Own the pooled SQLite connections used by repositories and migrations.
//! - Execute parametrized statements and map rows into owned values.
//! - Rebind generic `?` placeholders for the configured dialect.
//!
//! # Invariants
//! - Every statement checks its [`Context`] before running and is interrupted
//!   once the context is cancelled or past its deadline.
//! - A client that is not connected (or already closed) fails every call with
//!   [`DbError::NotInitialized`].

use std::error::Error;
use std::fmt::{Display, Formatter};

mod client;
mod config;
mod context;
mod dialect;
mod executor;
pub mod migrations;
mod row;
mod tx;
mod value;

pub use client::Client;
pub use config::{ClientConfig, MEMORY_DSN};
pub use context::Context;
pub use dialect::Dialect;
pub use executor::Executor;
pub use row::Row;
pub use rusqlite::types::Value;
pub use tx::Tx;
pub use value::IntoValue;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    /// The client has not connected yet, or has been closed.
    NotInitialized,
    /// A single-row query produced no rows.
    NoRows,
    Cancelled,
    DeadlineExceeded,
    UnsupportedDriver(String),
    InvalidConfig(String),
}

impl DbError {
    /// Returns whether this error came from the caller's context rather than
    /// the database.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool error: {err}"),
            Self::NotInitialized => write!(f, "database client is not initialized"),
            Self::NoRows => write!(f, "query returned no rows"),
            Self::Cancelled => write!(f, "context cancelled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
            Self::UnsupportedDriver(driver) => write!(f, "unsupported database driver `{driver}`"),
            Self::InvalidConfig(message) => write!(f, "invalid client configuration: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::NotInitialized
            | Self::NoRows
            | Self::Cancelled
            | Self::DeadlineExceeded
            | Self::UnsupportedDriver(_)
            | Self::InvalidConfig(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Self::NoRows,
            other => Self::Sqlite(other),
        }
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
