//! Transaction handle bound to one pooled connection.

use super::client::PooledConnection;
use super::context::Context;
use super::dialect::Dialect;
use super::executor::{execute_on, query_on, run_on, Executor};
use super::row::Row;
use super::{DbResult, Value};
use log::{debug, warn};

/// An open transaction.
///
/// The handle owns its pooled connection until it is committed, rolled back
/// or dropped; dropping an unfinished transaction rolls it back. It is not
/// `Sync`, so it cannot be shared between concurrent callers.
pub struct Tx {
    conn: PooledConnection,
    ctx: Context,
    dialect: Dialect,
    finished: bool,
}

impl Tx {
    pub(crate) fn begin(conn: PooledConnection, ctx: &Context, dialect: Dialect) -> DbResult<Self> {
        // IMMEDIATE takes the write lock up front so a later write cannot fail
        // with SQLITE_BUSY halfway through the transaction.
        execute_on(&conn, ctx, "BEGIN IMMEDIATE", &[])?;
        debug!("event=tx_begin module=db status=ok");
        Ok(Self {
            conn,
            ctx: ctx.clone(),
            dialect,
            finished: false,
        })
    }

    /// Commits the transaction.
    ///
    /// If the context the transaction was started with is already done, the
    /// transaction is rolled back instead and the context error is returned.
    pub fn commit(mut self) -> DbResult<()> {
        if let Some(err) = self.ctx.err() {
            self.rollback_inner()?;
            return Err(err);
        }
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("event=tx_commit module=db status=ok");
        Ok(())
    }

    /// Runs one statement inside the transaction, discarding any rows it
    /// returns.
    pub(crate) fn run(&self, ctx: &Context, sql: &str) -> DbResult<()> {
        run_on(&self.conn, ctx, sql)
    }

    pub fn rollback(mut self) -> DbResult<()> {
        self.rollback_inner()
    }

    fn rollback_inner(&mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("event=tx_rollback module=db status=ok");
        Ok(())
    }
}

impl Executor for Tx {
    fn execute(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<usize> {
        execute_on(&self.conn, ctx, sql, args)
    }

    fn query(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        query_on(&self.conn, ctx, sql, args)
    }

    fn rebind(&self, sql: &str) -> String {
        self.dialect.rebind(sql)
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!("event=tx_rollback module=db status=error trigger=drop error={err}");
        }
    }
}
