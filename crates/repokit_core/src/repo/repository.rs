//! Pool-backed repository for one entity type.

use super::error::{RepoError, RepoResult};
use super::mapping::EntityMapping;
use super::record::Record;
use super::store::EntityStore;
use super::tx_repo::TxRepository;
use crate::db::{Client, Context, Executor, Tx};
use crate::model::Entity;
use log::{debug, warn};
use std::marker::PhantomData;
use std::sync::Arc;

/// Stateless repository bound to a [`Client`].
///
/// Constructed behind an `Arc` so records can keep a weak back-reference.
/// Safe to share between threads.
pub struct Repository<T: Entity> {
    client: Client,
    mapping: Arc<EntityMapping>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.mapping.table())
            .field("client", &self.client)
            .finish()
    }
}

impl<T: Entity> Repository<T> {
    /// Builds a repository after validating `T`'s mapping.
    ///
    /// # Errors
    /// - `InvalidModel` when the table or a column is not a plain identifier,
    ///   a column repeats, or a mapped column shadows a base column.
    pub fn new(client: Client) -> RepoResult<Arc<Self>> {
        let mapping = EntityMapping::of::<T>()?;
        Ok(Arc::new(Self {
            client,
            mapping,
            _entity: PhantomData,
        }))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Wraps a fresh, unsaved entity.
    pub fn new_record(self: &Arc<Self>) -> Record<T> {
        self.wrap(T::default())
    }

    /// Wraps a caller-supplied entity.
    pub fn wrap(self: &Arc<Self>, entity: T) -> Record<T> {
        Record::new(entity, Arc::downgrade(self))
    }

    /// Scopes operations to a transaction the caller manages.
    pub fn with_tx<'tx>(&self, tx: &'tx Tx) -> TxRepository<'tx, T> {
        TxRepository::new(tx, Arc::clone(&self.mapping))
    }

    /// Runs `f` inside one transaction.
    ///
    /// An error from `f` rolls the transaction back and is returned; if the
    /// rollback fails too, both are returned as [`RepoError::Rollback`].
    /// Otherwise the transaction commits and a commit failure is returned.
    pub fn transaction<R, F>(&self, ctx: &Context, f: F) -> RepoResult<R>
    where
        F: FnOnce(&TxRepository<'_, T>) -> RepoResult<R>,
    {
        let tx = self
            .client
            .begin(ctx)
            .map_err(|source| RepoError::Db { op: "begin", source })?;

        let outcome = f(&self.with_tx(&tx));
        match outcome {
            Ok(value) => {
                tx.commit()
                    .map_err(|source| RepoError::Db { op: "commit", source })?;
                debug!(
                    "event=repo_transaction module=repo status=ok table={}",
                    self.mapping.table()
                );
                Ok(value)
            }
            Err(err) => match tx.rollback() {
                Ok(()) => {
                    debug!(
                        "event=repo_transaction module=repo status=rolled_back table={} error={err}",
                        self.mapping.table()
                    );
                    Err(err)
                }
                Err(rollback) => {
                    warn!(
                        "event=repo_transaction module=repo status=error table={} error={err} rollback_error={rollback}",
                        self.mapping.table()
                    );
                    Err(RepoError::Rollback {
                        source: Box::new(err),
                        rollback,
                    })
                }
            },
        }
    }
}

impl<T: Entity> EntityStore<T> for Repository<T> {
    fn executor(&self) -> &dyn Executor {
        &self.client
    }

    fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }
}
