//! Entity operations shared by pooled and transaction-scoped repositories.
//!
//! # Invariants
//! - Update, delete, hard delete, restore and touch refuse entities without an
//!   id before any hook runs.
//! - Reads and bulk writes are scoped to live rows unless the query widens
//!   visibility; bulk writes ignore widening.
//! - Bulk writes stamp their audit column in the same statement and never run
//!   entity hooks.

use super::error::{RepoError, RepoResult};
use super::mapping::{is_identifier, EntityMapping};
use crate::db::{Context, DbError, Executor, IntoValue, Value};
use crate::model::hooks::{run_after, run_before, WriteKind};
use crate::model::{BaseEntity, Entity};
use crate::query::Query;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use uuid::Uuid;

/// One page of results plus the totals needed to render paging controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// CRUD, lookup and bulk operations for one entity type.
///
/// Implementors only supply the executor and the mapping; every operation is
/// provided. [`super::Repository`] runs on the pool, [`super::TxRepository`]
/// inside one transaction.
pub trait EntityStore<T: Entity> {
    fn executor(&self) -> &dyn Executor;

    fn mapping(&self) -> &EntityMapping;

    fn table_name(&self) -> &str {
        self.mapping().table()
    }

    /// Inserts a new row.
    ///
    /// Assigns a UUID v4 id when the entity has none and stamps
    /// `created_at = updated_at = now`. On failure the entity's base fields
    /// are left as they were.
    fn create(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        run_before(entity, ctx, WriteKind::Create).map_err(RepoError::Hook)?;

        let previous = entity.base().clone();
        let now = Utc::now();
        {
            let base = entity.base_mut();
            if base.id.is_empty() {
                base.id = Uuid::new_v4().to_string();
            }
            base.created_at = now;
            base.updated_at = now;
        }

        let table = self.table_name();
        let written = write_values(entity.base().values(), entity, "create", table).and_then(|args| {
            let sql = self.mapping().insert_sql();
            run_write(self.executor(), table, ctx, "create", sql, &args)
        });
        if let Err(err) = written {
            *entity.base_mut() = previous;
            return Err(err);
        }

        run_after(entity, ctx, WriteKind::Create).map_err(RepoError::Hook)
    }

    /// Rewrites every mapped column of a live row and refreshes `updated_at`.
    fn update(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        update_row(self, ctx, entity, "update")
    }

    /// Creates new entities and updates persisted ones.
    fn save(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        if entity.base().is_new() {
            self.create(ctx, entity)
        } else {
            self.update(ctx, entity)
        }
    }

    /// Re-stamps `updated_at` through the regular update path.
    fn touch(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        update_row(self, ctx, entity, "touch")
    }

    /// Soft delete: sets `deleted_at` on a live row.
    fn delete(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        ensure_persisted(entity.base(), "delete")?;
        run_before(entity, ctx, WriteKind::Delete).map_err(RepoError::Hook)?;

        let now = Utc::now();
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            self.table_name()
        );
        let args = vec![now.into_value(), entity.base().id.as_str().into_value()];
        let affected = run_write(self.executor(), self.table_name(), ctx, "delete", &sql, &args)?;
        expect_one_row(self.table_name(), entity.base(), affected)?;
        entity.base_mut().deleted_at = Some(now);

        run_after(entity, ctx, WriteKind::Delete).map_err(RepoError::Hook)
    }

    /// Removes the row by id, whether it is live or soft-deleted.
    fn hard_delete(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        ensure_persisted(entity.base(), "hard_delete")?;
        run_before(entity, ctx, WriteKind::Delete).map_err(RepoError::Hook)?;

        let sql = format!("DELETE FROM {} WHERE id = ?", self.table_name());
        let args = vec![entity.base().id.as_str().into_value()];
        let affected =
            run_write(self.executor(), self.table_name(), ctx, "hard_delete", &sql, &args)?;
        expect_one_row(self.table_name(), entity.base(), affected)?;

        run_after(entity, ctx, WriteKind::Delete).map_err(RepoError::Hook)
    }

    /// Clears `deleted_at` on a soft-deleted row and refreshes `updated_at`.
    fn restore(&self, ctx: &Context, entity: &mut T) -> RepoResult<()> {
        ensure_persisted(entity.base(), "restore")?;

        let now = Utc::now();
        let sql = format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = ? WHERE id = ? AND deleted_at IS NOT NULL",
            self.table_name()
        );
        let args = vec![now.into_value(), entity.base().id.as_str().into_value()];
        let affected = run_write(self.executor(), self.table_name(), ctx, "restore", &sql, &args)?;
        expect_one_row(self.table_name(), entity.base(), affected)?;

        let base = entity.base_mut();
        base.deleted_at = None;
        base.updated_at = now;
        Ok(())
    }

    fn find_by_id(&self, ctx: &Context, id: &str) -> RepoResult<T> {
        let query = Query::new().where_eq("id", id).limit(1);
        self.find_all(ctx, query)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::not_found(self.table_name(), id))
    }

    /// Live rows whose id is in `ids`; missing ids are skipped.
    fn find_by_ids(&self, ctx: &Context, ids: &[&str]) -> RepoResult<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.find_all(ctx, Query::new().where_in("id", ids.iter().copied()))
    }

    fn find_all(&self, ctx: &Context, query: Query) -> RepoResult<Vec<T>> {
        let statement = query.build(self.table_name());
        let sql = self.executor().rebind(&statement.sql);
        let rows = self
            .executor()
            .query(ctx, &sql, &statement.args)
            .map_err(|err| fail(self.table_name(), "find", err))?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entity =
                T::from_row(row).map_err(|err| fail(self.table_name(), "find", err))?;
            entity.after_find(ctx).map_err(RepoError::Hook)?;
            entities.push(entity);
        }
        Ok(entities)
    }

    /// First row of `query`, or `NotFound` when it matches nothing.
    fn find_one(&self, ctx: &Context, query: Query) -> RepoResult<T> {
        self.find_all(ctx, query.limit(1))?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound {
                table: self.table_name().to_string(),
                id: None,
            })
    }

    /// Oldest matching row by `created_at`.
    fn first(&self, ctx: &Context, query: Query) -> RepoResult<T> {
        let column = format!("{}.created_at", self.table_name());
        self.find_one(ctx, query.order_by(&column, "ASC"))
    }

    /// Newest matching row by `created_at`.
    fn last(&self, ctx: &Context, query: Query) -> RepoResult<T> {
        let column = format!("{}.created_at", self.table_name());
        self.find_one(ctx, query.order_by(&column, "DESC"))
    }

    /// Applies 1-indexed paging to `query` and counts the unpaged total.
    fn find_page(
        &self,
        ctx: &Context,
        query: Query,
        page: i64,
        per_page: i64,
    ) -> RepoResult<Page<T>> {
        let (page, per_page) = crate::query::normalize_page(page, per_page);
        let total = self.count(ctx, query.clone())?;
        let items = self.find_all(ctx, query.paginate(page, per_page))?;
        Ok(Page {
            items,
            total,
            page,
            per_page,
            total_pages: total.saturating_add(per_page - 1) / per_page,
        })
    }

    fn count(&self, ctx: &Context, query: Query) -> RepoResult<i64> {
        let statement = query.build_count(self.table_name());
        let sql = self.executor().rebind(&statement.sql);
        self.executor()
            .query_one(ctx, &sql, &statement.args)
            .and_then(|row| row.get_index::<i64>(0))
            .map_err(|err| fail(self.table_name(), "count", err))
    }

    /// Whether a live row with `id` exists.
    fn exists(&self, ctx: &Context, id: &str) -> RepoResult<bool> {
        let filter = Query::new().where_eq("id", id).build_where(self.table_name());
        let sql = self.executor().rebind(&format!(
            "SELECT EXISTS(SELECT 1 FROM {}{})",
            self.table_name(),
            filter.sql
        ));
        self.executor()
            .query_one(ctx, &sql, &filter.args)
            .and_then(|row| row.get_index::<bool>(0))
            .map_err(|err| fail(self.table_name(), "exists", err))
    }

    fn exists_where(&self, ctx: &Context, query: Query) -> RepoResult<bool> {
        Ok(self.count(ctx, query)? > 0)
    }

    /// Soft-deletes every live row matching `query` and returns how many
    /// rows changed. Joins on `query` are not rendered.
    fn delete_where(&self, ctx: &Context, query: Query) -> RepoResult<usize> {
        let filter = query.live_only().build_where(self.table_name());
        let sql = format!("UPDATE {} SET deleted_at = ?{}", self.table_name(), filter.sql);
        let mut args = Vec::with_capacity(filter.args.len() + 1);
        args.push(Utc::now().into_value());
        args.extend(filter.args);

        let affected =
            run_write(self.executor(), self.table_name(), ctx, "delete_where", &sql, &args)?;
        debug!(
            "event=repo_bulk module=repo status=ok op=delete_where table={} affected={affected}",
            self.table_name()
        );
        Ok(affected)
    }

    /// Sets `updates` on every live row matching `query`, bumping
    /// `updated_at` in the same statement.
    ///
    /// # Errors
    /// - `InvalidModel` when `updates` is empty or names a base column.
    fn update_where(
        &self,
        ctx: &Context,
        updates: &[(&str, Value)],
        query: Query,
    ) -> RepoResult<usize> {
        if updates.is_empty() {
            return Err(RepoError::InvalidModel(
                "update_where needs at least one column".to_string(),
            ));
        }

        let mut assignments = Vec::with_capacity(updates.len() + 1);
        let mut args = Vec::with_capacity(updates.len() + 1);
        for (column, value) in updates {
            if !is_identifier(column) || BaseEntity::COLUMNS.contains(column) {
                return Err(RepoError::InvalidModel(format!(
                    "update_where cannot set column `{column}`"
                )));
            }
            assignments.push(format!("{column} = ?"));
            args.push(value.clone());
        }
        assignments.push("updated_at = ?".to_string());
        args.push(Utc::now().into_value());

        let filter = query.live_only().build_where(self.table_name());
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table_name(),
            assignments.join(", "),
            filter.sql
        );
        args.extend(filter.args);

        let affected =
            run_write(self.executor(), self.table_name(), ctx, "update_where", &sql, &args)?;
        debug!(
            "event=repo_bulk module=repo status=ok op=update_where table={} affected={affected}",
            self.table_name()
        );
        Ok(affected)
    }
}

fn ensure_persisted(base: &BaseEntity, op: &'static str) -> RepoResult<()> {
    if base.is_new() {
        return Err(RepoError::NotPersisted { op });
    }
    Ok(())
}

fn update_row<T, S>(store: &S, ctx: &Context, entity: &mut T, op: &'static str) -> RepoResult<()>
where
    T: Entity,
    S: EntityStore<T> + ?Sized,
{
    ensure_persisted(entity.base(), op)?;
    run_before(entity, ctx, WriteKind::Update).map_err(RepoError::Hook)?;

    let previous: DateTime<Utc> = entity.base().updated_at;
    entity.base_mut().updated_at = Utc::now();

    let written = write_values(
        vec![entity.base().updated_at.into_value()],
        entity,
        op,
        store.table_name(),
    )
    .and_then(|mut args| {
        args.push(entity.base().id.as_str().into_value());
        let sql = store.mapping().update_sql();
        run_write(store.executor(), store.table_name(), ctx, op, sql, &args)
    })
    .and_then(|affected| expect_one_row(store.table_name(), entity.base(), affected));
    if let Err(err) = written {
        entity.base_mut().updated_at = previous;
        return Err(err);
    }

    run_after(entity, ctx, WriteKind::Update).map_err(RepoError::Hook)
}

/// Appends the entity's mapped values to `leading`.
fn write_values<T: Entity>(
    mut leading: Vec<Value>,
    entity: &T,
    op: &'static str,
    table: &str,
) -> RepoResult<Vec<Value>> {
    let mapped = entity.to_values().map_err(|err| fail(table, op, err))?;
    leading.extend(mapped);
    Ok(leading)
}

fn run_write(
    executor: &dyn Executor,
    table: &str,
    ctx: &Context,
    op: &'static str,
    sql: &str,
    args: &[Value],
) -> RepoResult<usize> {
    let sql = executor.rebind(sql);
    executor
        .execute(ctx, &sql, args)
        .map_err(|err| fail(table, op, err))
}

fn expect_one_row(table: &str, base: &BaseEntity, affected: usize) -> RepoResult<()> {
    if affected == 0 {
        return Err(RepoError::not_found(table, &base.id));
    }
    Ok(())
}

fn fail(table: &str, op: &'static str, err: DbError) -> RepoError {
    let err = RepoError::from_db(op, table, err);
    if let RepoError::Db { source, .. } = &err {
        if !source.is_context_error() {
            warn!("event=repo_{op} module=repo status=error table={table} error={source}");
        }
    }
    err
}
