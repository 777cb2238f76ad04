//! Generic SQLite data-access layer: pooled client, entity repositories with
//! soft delete and lifecycle hooks, a query builder and a migration runner.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use db::migrations::{
    MigrateError, MigrateResult, Migration, MigrationRecord, MigrationStatus, MigrationStep,
    Runner,
};
pub use db::{Client, ClientConfig, Context, DbError, DbResult, Executor, IntoValue, Row, Tx, Value};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{BaseEntity, Entity, HookError, HookResult, Hooks};
pub use query::{Direction, Query, Statement};
pub use repo::{
    EntityMapping, EntityStore, Page, Record, RepoError, RepoResult, Repository, TxRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
