//! Repository view bound to one open transaction.

use super::mapping::EntityMapping;
use super::store::EntityStore;
use crate::db::{Executor, Tx};
use crate::model::Entity;
use std::marker::PhantomData;
use std::sync::Arc;

/// Same operations as [`super::Repository`], run on a single [`Tx`].
///
/// Borrows the transaction, so it cannot outlive it and, like the
/// transaction, cannot be shared across threads.
pub struct TxRepository<'tx, T: Entity> {
    tx: &'tx Tx,
    mapping: Arc<EntityMapping>,
    _entity: PhantomData<fn() -> T>,
}

impl<'tx, T: Entity> TxRepository<'tx, T> {
    pub(crate) fn new(tx: &'tx Tx, mapping: Arc<EntityMapping>) -> Self {
        Self {
            tx,
            mapping,
            _entity: PhantomData,
        }
    }

    /// The transaction this view writes through, for raw statements that
    /// must share it.
    pub fn tx(&self) -> &'tx Tx {
        self.tx
    }

    /// Scopes another entity type to the same transaction.
    pub fn scoped<U: Entity>(&self) -> super::RepoResult<TxRepository<'tx, U>> {
        Ok(TxRepository::new(self.tx, EntityMapping::of::<U>()?))
    }
}

impl<T: Entity> EntityStore<T> for TxRepository<'_, T> {
    fn executor(&self) -> &dyn Executor {
        self.tx
    }

    fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }
}
