//! Versioned schema migrations tracked in a database table.
//!
//! # Responsibility
//! - Register migrations from code or from `<version>_<name>.{up,down}.sql`
//!   files.
//! - Move migrations between pending and applied in version order.
//!
//! # Invariants
//! - Versions compare as strings; use fixed-width values such as
//!   `20240101120000`.
//! - Each migration runs in its own transaction together with its tracking
//!   row insert/delete, so one failure never undoes earlier migrations.
//! - A failure while running a batch reports how many migrations completed.

use crate::db::{Context, DbError, Tx};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

mod loader;
mod runner;
mod split;

pub use runner::{Runner, DEFAULT_TABLE};

pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error returned by a Rust migration step.
pub type StepError = Box<dyn Error + Send + Sync>;

/// Rust migration step; runs inside the migration's transaction.
pub type MigrationFn = Arc<dyn Fn(&Tx, &Context) -> Result<(), StepError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// One direction of a migration.
#[derive(Clone)]
pub enum MigrationStep {
    /// One or more `;`-separated statements.
    Sql(String),
    Func(MigrationFn),
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// A named, versioned schema change with an optional reverse step.
#[derive(Debug, Clone)]
pub struct Migration {
    version: String,
    name: String,
    up: MigrationStep,
    down: Option<MigrationStep>,
}

impl Migration {
    pub fn new(version: impl Into<String>, name: impl Into<String>, up: MigrationStep) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            up,
            down: None,
        }
    }

    pub fn sql(version: impl Into<String>, name: impl Into<String>, up: impl Into<String>) -> Self {
        Self::new(version, name, MigrationStep::Sql(up.into()))
    }

    pub fn func<F>(version: impl Into<String>, name: impl Into<String>, up: F) -> Self
    where
        F: Fn(&Tx, &Context) -> Result<(), StepError> + Send + Sync + 'static,
    {
        Self::new(version, name, MigrationStep::Func(Arc::new(up)))
    }

    pub fn with_down(mut self, down: MigrationStep) -> Self {
        self.down = Some(down);
        self
    }

    pub fn down_sql(self, down: impl Into<String>) -> Self {
        self.with_down(MigrationStep::Sql(down.into()))
    }

    pub fn down_func<F>(self, down: F) -> Self
    where
        F: Fn(&Tx, &Context) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.with_down(MigrationStep::Func(Arc::new(down)))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    pub(crate) fn step(&self, direction: Direction) -> Option<&MigrationStep> {
        match direction {
            Direction::Up => Some(&self.up),
            Direction::Down => self.down.as_ref(),
        }
    }
}

/// One row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub version: String,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// State of one version across code and the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    pub registered: bool,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum MigrateError {
    Db(DbError),
    /// The tracking table name is not a plain identifier.
    InvalidTable(String),
    InvalidMigration(String),
    DuplicateVersion(String),
    /// A version is tracked or requested but not registered.
    UnknownVersion(String),
    /// The migration has no down step.
    Irreversible(String),
    /// A migration step or its tracking write failed; the migration was
    /// rolled back.
    Step {
        version: String,
        direction: Direction,
        source: StepError,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A batch stopped after `applied` migrations completed.
    Partial {
        applied: usize,
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Migrations completed before the failure.
    pub fn applied(&self) -> usize {
        match self {
            Self::Partial { applied, .. } => *applied,
            _ => 0,
        }
    }

    /// Unwraps a `Partial` to the error that stopped the batch.
    pub fn root(&self) -> &MigrateError {
        match self {
            Self::Partial { source, .. } => source.root(),
            other => other,
        }
    }
}

impl Display for MigrateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidTable(name) => write!(f, "invalid migration table name `{name}`"),
            Self::InvalidMigration(message) => write!(f, "invalid migration: {message}"),
            Self::DuplicateVersion(version) => {
                write!(f, "migration version {version} is registered twice")
            }
            Self::UnknownVersion(version) => {
                write!(f, "migration version {version} is not registered")
            }
            Self::Irreversible(version) => {
                write!(f, "migration version {version} has no down step")
            }
            Self::Step {
                version,
                direction,
                source,
            } => write!(f, "migration {version} ({direction}) failed: {source}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Partial { applied, source } => {
                write!(f, "{source} ({applied} migration(s) completed before the failure)")
            }
        }
    }
}

impl Error for MigrateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Step { source, .. } => Some(source.as_ref()),
            Self::Io { source, .. } => Some(source),
            Self::Partial { source, .. } => Some(source.as_ref()),
            Self::InvalidTable(_)
            | Self::InvalidMigration(_)
            | Self::DuplicateVersion(_)
            | Self::UnknownVersion(_)
            | Self::Irreversible(_) => None,
        }
    }
}

impl From<DbError> for MigrateError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
