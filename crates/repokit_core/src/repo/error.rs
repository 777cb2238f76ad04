//! Repository error model.

use crate::db::DbError;
use crate::model::HookError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};

static DUPLICATE_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)unique constraint|duplicate key|duplicate entry")
        .expect("valid duplicate-key regex")
});

pub type RepoResult<T> = Result<T, RepoError>;

/// Semantic repository errors.
///
/// Driver failures that are neither "no rows" nor a unique violation are
/// kept verbatim in [`RepoError::Db`] together with the operation name.
#[derive(Debug)]
pub enum RepoError {
    /// Zero rows matched a scoped read or write.
    NotFound { table: String, id: Option<String> },
    /// A unique or primary-key constraint rejected the write.
    DuplicateKey { op: &'static str, message: String },
    /// A write-style operation was attempted on an entity without an id.
    NotPersisted { op: &'static str },
    /// The entity type declares an unusable table or column mapping, or a
    /// bulk update names columns it may not touch.
    InvalidModel(String),
    /// The repository that produced a record has been dropped.
    Detached,
    /// A lifecycle hook refused the operation.
    Hook(HookError),
    /// Rolling back after `source` failed as well.
    Rollback {
        source: Box<RepoError>,
        rollback: DbError,
    },
    Db { op: &'static str, source: DbError },
}

impl RepoError {
    /// Classifies a client error raised while running `op` against `table`.
    pub(crate) fn from_db(op: &'static str, table: &str, err: DbError) -> Self {
        match err {
            DbError::NoRows => Self::NotFound {
                table: table.to_string(),
                id: None,
            },
            DbError::Sqlite(ref inner) if is_unique_violation(inner) => Self::DuplicateKey {
                op,
                message: inner.to_string(),
            },
            other => Self::Db { op, source: other },
        }
    }

    pub(crate) fn not_found(table: &str, id: &str) -> Self {
        Self::NotFound {
            table: table.to_string(),
            id: Some(id.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the underlying client error, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            Self::Db { source, .. } => Some(source),
            Self::Rollback { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return true;
            }
            message
                .as_deref()
                .is_some_and(|text| DUPLICATE_MESSAGE.is_match(text))
        }
        other => DUPLICATE_MESSAGE.is_match(&other.to_string()),
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table, id: Some(id) } => {
                write!(f, "record not found in `{table}`: {id}")
            }
            Self::NotFound { table, id: None } => write!(f, "record not found in `{table}`"),
            Self::DuplicateKey { op, message } => write!(f, "{op}: duplicate key: {message}"),
            Self::NotPersisted { op } => write!(f, "{op}: entity has not been persisted"),
            Self::InvalidModel(message) => write!(f, "invalid model: {message}"),
            Self::Detached => write!(f, "record is detached from its repository"),
            Self::Hook(err) => write!(f, "{err}"),
            Self::Rollback { source, rollback } => {
                write!(f, "rollback failed: {rollback} (after: {source})")
            }
            Self::Db { op, source } => write!(f, "{op}: {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Hook(err) => Some(err.as_ref()),
            Self::Rollback { source, .. } => Some(source.as_ref()),
            Self::Db { source, .. } => Some(source),
            Self::NotFound { .. }
            | Self::DuplicateKey { .. }
            | Self::NotPersisted { .. }
            | Self::InvalidModel(_)
            | Self::Detached => None,
        }
    }
}
