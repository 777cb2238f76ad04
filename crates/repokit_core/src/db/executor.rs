//! Statement execution seam shared by the pooled client and transactions.

use super::context::Context;
use super::row::Row;
use super::{DbError, DbResult, Value};
use crate::logging::summarize_sql;
use log::debug;
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use std::time::Instant;

/// Anything that can run parametrized statements: a [`super::Client`] or an
/// open [`super::Tx`].
pub trait Executor {
    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<usize>;

    /// Runs a query and collects every row.
    fn query(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<Vec<Row>>;

    /// Translates generic `?` placeholders for the active dialect.
    fn rebind(&self, sql: &str) -> String;

    /// Runs a query expected to produce at least one row and returns the first.
    ///
    /// # Errors
    /// - `NoRows` when the result set is empty.
    fn query_one(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<Row> {
        self.query(ctx, sql, args)?
            .into_iter()
            .next()
            .ok_or(DbError::NoRows)
    }
}

/// Installs the context's interrupt probe for one statement and removes it
/// once the statement is done.
struct InterruptGuard<'conn> {
    conn: &'conn Connection,
}

impl<'conn> InterruptGuard<'conn> {
    // Polled every 1000 VM instructions.
    const PROGRESS_OPS: i32 = 1_000;

    fn install(conn: &'conn Connection, ctx: &Context) -> Self {
        conn.progress_handler(Self::PROGRESS_OPS, Some(ctx.interrupt_probe()));
        Self { conn }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Maps a driver error, preferring the context's reason when the statement was
/// interrupted because the context finished.
fn finish<T>(ctx: &Context, result: rusqlite::Result<T>) -> DbResult<T> {
    result.map_err(|err| match ctx.err() {
        Some(ctx_err) => ctx_err,
        None => DbError::from(err),
    })
}

pub(crate) fn execute_on(
    conn: &Connection,
    ctx: &Context,
    sql: &str,
    args: &[Value],
) -> DbResult<usize> {
    ctx.check()?;
    let started_at = Instant::now();
    let result = {
        let _guard = InterruptGuard::install(conn, ctx);
        conn.prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(args)))
    };
    let affected = finish(ctx, result)?;
    debug!(
        "event=db_execute module=db status=ok duration_ms={} affected={} sql={}",
        started_at.elapsed().as_millis(),
        affected,
        summarize_sql(sql)
    );
    Ok(affected)
}

pub(crate) fn query_on(
    conn: &Connection,
    ctx: &Context,
    sql: &str,
    args: &[Value],
) -> DbResult<Vec<Row>> {
    ctx.check()?;
    let started_at = Instant::now();
    let result = {
        let _guard = InterruptGuard::install(conn, ctx);
        collect_rows(conn, sql, args)
    };
    let rows = finish(ctx, result)?;
    debug!(
        "event=db_query module=db status=ok duration_ms={} rows={} sql={}",
        started_at.elapsed().as_millis(),
        rows.len(),
        summarize_sql(sql)
    );
    Ok(rows)
}

/// Runs one statement and discards any rows it produces.
///
/// Used for schema scripts, where `PRAGMA` and `SELECT` statements may sit
/// between DDL statements.
pub(crate) fn run_on(conn: &Connection, ctx: &Context, sql: &str) -> DbResult<()> {
    ctx.check()?;
    let started_at = Instant::now();
    let result = {
        let _guard = InterruptGuard::install(conn, ctx);
        drain_rows(conn, sql)
    };
    let discarded = finish(ctx, result)?;
    debug!(
        "event=db_run module=db status=ok duration_ms={} discarded_rows={} sql={}",
        started_at.elapsed().as_millis(),
        discarded,
        summarize_sql(sql)
    );
    Ok(())
}

fn drain_rows(conn: &Connection, sql: &str) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.raw_query();
    let mut discarded = 0usize;
    while rows.next()?.is_some() {
        discarded += 1;
    }
    Ok(discarded)
}

fn collect_rows(conn: &Connection, sql: &str, args: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.query(params_from_iter(args))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(row.get::<_, Value>(idx)?);
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }

    Ok(out)
}
