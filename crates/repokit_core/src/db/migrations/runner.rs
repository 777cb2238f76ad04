//! Migration runner over a [`Client`].

use super::loader;
use super::split::split_statements;
use super::{
    Direction, MigrateError, MigrateResult, Migration, MigrationRecord, MigrationStatus,
    MigrationStep,
};
use crate::db::{Client, Context, Executor, IntoValue, Tx};
use crate::repo::is_identifier;
use chrono::Utc;
use log::{error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

pub const DEFAULT_TABLE: &str = "schema_migrations";

/// Applies and reverts registered migrations against one tracking table.
///
/// Meant to run once at bootstrap; concurrent runners on the same database
/// are not coordinated.
#[derive(Debug)]
pub struct Runner {
    client: Client,
    table: String,
    migrations: BTreeMap<String, Migration>,
}

impl Runner {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            table: DEFAULT_TABLE.to_string(),
            migrations: BTreeMap::new(),
        }
    }

    /// Uses `table` instead of `schema_migrations`.
    pub fn with_table(mut self, table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(MigrateError::InvalidTable(table));
        }
        self.table = table;
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Registered migrations in ascending version order.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    /// # Errors
    /// - `InvalidMigration` for an empty or whitespace-containing version,
    ///   an empty name, or an up step with no SQL statements.
    /// - `DuplicateVersion` when the version is already registered.
    pub fn register(&mut self, migration: Migration) -> MigrateResult<()> {
        let version = migration.version();
        if version.is_empty() || version.chars().any(char::is_whitespace) {
            return Err(MigrateError::InvalidMigration(format!(
                "version `{version}` must be non-empty without whitespace"
            )));
        }
        if migration.name().trim().is_empty() {
            return Err(MigrateError::InvalidMigration(format!(
                "version {version} has an empty name"
            )));
        }
        if let Some(MigrationStep::Sql(sql)) = migration.step(Direction::Up) {
            if split_statements(sql).is_empty() {
                return Err(MigrateError::InvalidMigration(format!(
                    "version {version} has no up statements"
                )));
            }
        }
        if self.migrations.contains_key(version) {
            return Err(MigrateError::DuplicateVersion(version.to_string()));
        }

        self.migrations.insert(version.to_string(), migration);
        Ok(())
    }

    /// Registers every migration file pair found in `dir` and returns how
    /// many were added.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> MigrateResult<usize> {
        let migrations = loader::load_dir(dir.as_ref())?;
        let count = migrations.len();
        for migration in migrations {
            self.register(migration)?;
        }
        info!(
            "event=migrate_load module=migrate status=ok dir={} count={count}",
            dir.as_ref().display()
        );
        Ok(count)
    }

    /// Applies every pending migration in ascending order.
    pub fn up(&self, ctx: &Context) -> MigrateResult<usize> {
        let pending = self.pending_migrations(ctx)?;
        self.run_batch(ctx, &pending, Direction::Up)
    }

    /// Applies the lowest pending migration, if any.
    pub fn up_one(&self, ctx: &Context) -> MigrateResult<usize> {
        let pending = self.pending_migrations(ctx)?;
        self.run_batch(ctx, &pending[..pending.len().min(1)], Direction::Up)
    }

    /// Applies pending migrations up to and including `version`.
    pub fn up_to(&self, ctx: &Context, version: &str) -> MigrateResult<usize> {
        if !self.migrations.contains_key(version) {
            return Err(MigrateError::UnknownVersion(version.to_string()));
        }
        let pending: Vec<&Migration> = self
            .pending_migrations(ctx)?
            .into_iter()
            .filter(|migration| migration.version() <= version)
            .collect();
        self.run_batch(ctx, &pending, Direction::Up)
    }

    /// Reverts the most recently applied migration. Returns 0 when nothing
    /// is applied.
    ///
    /// # Errors
    /// - `UnknownVersion` when the last applied version is not registered.
    /// - `Irreversible` when it has no down step.
    pub fn down(&self, ctx: &Context) -> MigrateResult<usize> {
        let applied = self.applied_versions(ctx)?;
        let last: Vec<String> = applied.into_iter().next_back().into_iter().collect();
        let plan = self.revert_plan(&last)?;
        self.run_batch(ctx, &plan, Direction::Down)
    }

    /// Reverts applied migrations newer than `version`; `version` itself stays
    /// applied.
    pub fn down_to(&self, ctx: &Context, version: &str) -> MigrateResult<usize> {
        let applied = self.applied_versions(ctx)?;
        if !self.migrations.contains_key(version) && !applied.contains(version) {
            return Err(MigrateError::UnknownVersion(version.to_string()));
        }
        let newer: Vec<String> = applied
            .into_iter()
            .rev()
            .filter(|applied| applied.as_str() > version)
            .collect();
        let plan = self.revert_plan(&newer)?;
        self.run_batch(ctx, &plan, Direction::Down)
    }

    /// Reverts every applied migration, newest first.
    pub fn reset(&self, ctx: &Context) -> MigrateResult<usize> {
        let applied: Vec<String> = self.applied_versions(ctx)?.into_iter().rev().collect();
        let plan = self.revert_plan(&applied)?;
        self.run_batch(ctx, &plan, Direction::Down)
    }

    /// `reset` followed by `up`; returns how many migrations were re-applied.
    pub fn refresh(&self, ctx: &Context) -> MigrateResult<usize> {
        self.reset(ctx)?;
        self.up(ctx)
    }

    /// Status for the union of registered and tracked versions.
    pub fn status(&self, ctx: &Context) -> MigrateResult<Vec<MigrationStatus>> {
        let tracked: BTreeMap<String, MigrationRecord> = self
            .applied(ctx)?
            .into_iter()
            .map(|record| (record.version.clone(), record))
            .collect();

        let versions: BTreeSet<&String> = self.migrations.keys().chain(tracked.keys()).collect();
        Ok(versions
            .into_iter()
            .map(|version| {
                let registered = self.migrations.get(version);
                let record = tracked.get(version);
                MigrationStatus {
                    version: version.clone(),
                    name: registered
                        .map(|migration| migration.name().to_string())
                        .or_else(|| record.map(|record| record.name.clone()))
                        .unwrap_or_default(),
                    registered: registered.is_some(),
                    applied: record.is_some(),
                    applied_at: record.map(|record| record.applied_at),
                }
            })
            .collect())
    }

    /// Highest applied version, or `None` when nothing is applied.
    pub fn version(&self, ctx: &Context) -> MigrateResult<Option<String>> {
        Ok(self.applied_versions(ctx)?.into_iter().next_back())
    }

    /// Registered versions not yet applied, ascending.
    pub fn pending(&self, ctx: &Context) -> MigrateResult<Vec<String>> {
        Ok(self
            .pending_migrations(ctx)?
            .into_iter()
            .map(|migration| migration.version().to_string())
            .collect())
    }

    /// Tracking rows, ascending by version.
    pub fn applied(&self, ctx: &Context) -> MigrateResult<Vec<MigrationRecord>> {
        self.ensure_table(ctx)?;
        let rows = self.client.query(
            ctx,
            &format!(
                "SELECT version, name, applied_at FROM {} ORDER BY version",
                self.table
            ),
            &[],
        )?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(MigrationRecord {
                version: row.get("version")?,
                name: row.get("name")?,
                applied_at: row.get("applied_at")?,
            });
        }
        Ok(records)
    }

    fn ensure_table(&self, ctx: &Context) -> MigrateResult<()> {
        self.client.execute(
            ctx,
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    version TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
                self.table
            ),
            &[],
        )?;
        Ok(())
    }

    fn applied_versions(&self, ctx: &Context) -> MigrateResult<BTreeSet<String>> {
        Ok(self
            .applied(ctx)?
            .into_iter()
            .map(|record| record.version)
            .collect())
    }

    fn pending_migrations(&self, ctx: &Context) -> MigrateResult<Vec<&Migration>> {
        let applied = self.applied_versions(ctx)?;
        Ok(self
            .migrations
            .values()
            .filter(|migration| !applied.contains(migration.version()))
            .collect())
    }

    /// Resolves versions to revert, failing before anything runs.
    fn revert_plan(&self, versions: &[String]) -> MigrateResult<Vec<&Migration>> {
        versions
            .iter()
            .map(|version| {
                let migration = self
                    .migrations
                    .get(version)
                    .ok_or_else(|| MigrateError::UnknownVersion(version.clone()))?;
                if !migration.is_reversible() {
                    return Err(MigrateError::Irreversible(version.clone()));
                }
                Ok(migration)
            })
            .collect()
    }

    fn run_batch(
        &self,
        ctx: &Context,
        plan: &[&Migration],
        direction: Direction,
    ) -> MigrateResult<usize> {
        let started_at = Instant::now();
        for (done, migration) in plan.iter().enumerate() {
            if let Err(err) = self.run_one(ctx, migration, direction) {
                error!(
                    "event=migrate_{direction} module=migrate status=error version={} completed={done} error={err}",
                    migration.version()
                );
                return Err(MigrateError::Partial {
                    applied: done,
                    source: Box::new(err),
                });
            }
        }
        if !plan.is_empty() {
            info!(
                "event=migrate_{direction} module=migrate status=ok count={} duration_ms={}",
                plan.len(),
                started_at.elapsed().as_millis()
            );
        }
        Ok(plan.len())
    }

    fn run_one(
        &self,
        ctx: &Context,
        migration: &Migration,
        direction: Direction,
    ) -> MigrateResult<()> {
        let started_at = Instant::now();
        let step = migration
            .step(direction)
            .ok_or_else(|| MigrateError::Irreversible(migration.version().to_string()))?;

        // Dropping the transaction on any error below rolls it back.
        let tx = self.client.begin(ctx)?;
        run_step(&tx, ctx, step).map_err(|source| MigrateError::Step {
            version: migration.version().to_string(),
            direction,
            source,
        })?;

        match direction {
            Direction::Up => tx.execute(
                ctx,
                &format!(
                    "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                    self.table
                ),
                &[
                    migration.version().into_value(),
                    migration.name().into_value(),
                    Utc::now().into_value(),
                ],
            )?,
            Direction::Down => tx.execute(
                ctx,
                &format!("DELETE FROM {} WHERE version = ?", self.table),
                &[migration.version().into_value()],
            )?,
        };
        tx.commit()?;

        info!(
            "event=migrate_step module=migrate status=ok direction={direction} version={} name={} duration_ms={}",
            migration.version(),
            migration.name(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }
}

fn run_step(tx: &Tx, ctx: &Context, step: &MigrationStep) -> Result<(), super::StepError> {
    match step {
        MigrationStep::Sql(sql) => {
            for statement in split_statements(sql) {
                tx.run(ctx, &statement)?;
            }
            Ok(())
        }
        MigrationStep::Func(func) => func(tx, ctx),
    }
}
