//! Pooled SQLite connection client.
//!
//! # Responsibility
//! - Build and own the `r2d2` connection pool.
//! - Configure every new connection (foreign keys, busy timeout, WAL).
//! - Hand out transactions bound to one pooled connection.
//!
//! # Invariants
//! - Calls made before [`Client::connect`] or after [`Client::close`] fail
//!   with `NotInitialized`.
//! - Waiting for a pooled connection never outlives the caller's deadline.

use super::config::ClientConfig;
use super::context::Context;
use super::dialect::Dialect;
use super::executor::{execute_on, query_on, Executor};
use super::row::Row;
use super::tx::Tx;
use super::{DbError, DbResult, Value};
use log::{error, info, warn};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

pub(crate) type SqlitePool = Pool<SqliteConnectionManager>;
pub(crate) type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Cheap-to-clone handle over one connection pool.
///
/// Clones share the same pool; closing one clone closes them all.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    dialect: Dialect,
    pool: RwLock<Option<SqlitePool>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("driver", &self.inner.config.driver)
            .field("dsn", &self.inner.config.dsn)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Client {
    /// Creates an unconnected client after validating `config`.
    pub fn new(config: ClientConfig) -> DbResult<Self> {
        let dialect = config.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                dialect,
                pool: RwLock::new(None),
            }),
        })
    }

    /// Creates a client and connects it in one step.
    pub fn open(config: ClientConfig, ctx: &Context) -> DbResult<Self> {
        let client = Self::new(config)?;
        client.connect(ctx)?;
        Ok(client)
    }

    /// Opens a private in-memory database backed by a single connection.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(ClientConfig::in_memory(), &Context::background())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Builds the pool and verifies one connection.
    ///
    /// Connecting an already connected client is a no-op.
    ///
    /// # Side effects
    /// - Emits `db_connect` logging events with duration and status.
    pub fn connect(&self, ctx: &Context) -> DbResult<()> {
        ctx.check()?;
        if self.is_connected() {
            return Ok(());
        }

        let started_at = Instant::now();
        let mode = if self.inner.config.is_memory() {
            "memory"
        } else {
            "file"
        };
        info!("event=db_connect module=db status=start mode={mode}");

        let pool = match build_pool(&self.inner.config) {
            Ok(pool) => pool,
            Err(err) => {
                error!(
                    "event=db_connect module=db status=error mode={mode} duration_ms={} error_code=db_pool_failed error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        let conn = pool.get()?;
        if let Err(err) = query_on(&conn, ctx, "SELECT 1", &[]) {
            error!(
                "event=db_connect module=db status=error mode={mode} duration_ms={} error_code=db_ping_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
        drop(conn);

        let mut slot = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(pool);
        }
        info!(
            "event=db_connect module=db status=ok mode={mode} duration_ms={} max_open={}",
            started_at.elapsed().as_millis(),
            self.inner.config.max_open
        );
        Ok(())
    }

    /// Verifies that a pooled connection can run a trivial statement.
    pub fn ping(&self, ctx: &Context) -> DbResult<()> {
        let conn = self.connection(ctx)?;
        query_on(&conn, ctx, "SELECT 1", &[]).map(|_| ())
    }

    /// Drops the pool. Connections currently checked out close when released.
    pub fn close(&self) {
        let previous = self
            .inner
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("event=db_close module=db status=ok");
        }
    }

    /// Starts a transaction on a dedicated pooled connection.
    pub fn begin(&self, ctx: &Context) -> DbResult<Tx> {
        let conn = self.connection(ctx)?;
        Tx::begin(conn, ctx, self.inner.dialect)
    }

    pub(crate) fn connection(&self, ctx: &Context) -> DbResult<PooledConnection> {
        ctx.check()?;
        let pool = self
            .inner
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::NotInitialized)?;

        let wait = match ctx.remaining() {
            Some(remaining) => remaining.min(self.inner.config.connect_timeout()),
            None => self.inner.config.connect_timeout(),
        };
        match pool.get_timeout(wait) {
            Ok(conn) => Ok(conn),
            Err(err) => {
                if let Some(ctx_err) = ctx.err() {
                    return Err(ctx_err);
                }
                warn!(
                    "event=db_acquire module=db status=error wait_ms={} error={}",
                    wait.as_millis(),
                    err
                );
                Err(DbError::Pool(err))
            }
        }
    }
}

impl Executor for Client {
    fn execute(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<usize> {
        let conn = self.connection(ctx)?;
        execute_on(&conn, ctx, sql, args)
    }

    fn query(&self, ctx: &Context, sql: &str, args: &[Value]) -> DbResult<Vec<Row>> {
        let conn = self.connection(ctx)?;
        query_on(&conn, ctx, sql, args)
    }

    fn rebind(&self, sql: &str) -> String {
        self.inner.dialect.rebind(sql)
    }
}

fn build_pool(config: &ClientConfig) -> DbResult<SqlitePool> {
    let memory = config.is_memory();
    let manager = if config.dsn.trim() == super::config::MEMORY_DSN {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(config.dsn.trim())
    };

    let busy_timeout = config.busy_timeout();
    let manager = manager.with_init(move |conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(busy_timeout)?;
        if !memory {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        Ok(())
    });

    let builder = Pool::builder().connection_timeout(config.connect_timeout());
    // Every in-memory connection is a separate database: keep exactly one
    // alive for the whole pool lifetime.
    let builder = if memory {
        builder
            .max_size(1)
            .min_idle(Some(1))
            .max_lifetime(None)
            .idle_timeout(None)
    } else {
        builder
            .max_size(config.max_open)
            .min_idle(Some(config.min_idle))
            .max_lifetime(config.max_lifetime_secs.map(Duration::from_secs))
            .idle_timeout(config.idle_timeout_secs.map(Duration::from_secs))
    };

    Ok(builder.build(manager)?)
}
