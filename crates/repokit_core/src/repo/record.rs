//! Active-record style wrapper around one entity.

use super::error::{RepoError, RepoResult};
use super::repository::Repository;
use super::store::EntityStore;
use crate::db::Context;
use crate::model::Entity;
use std::sync::{Arc, Weak};

/// One entity plus a weak handle to the repository that produced it.
///
/// New/persisted/deleted state is read from the entity's base fields on every
/// call. Once the repository is dropped, write and reload calls fail with
/// [`RepoError::Detached`].
#[derive(Debug)]
pub struct Record<T: Entity> {
    entity: T,
    repo: Weak<Repository<T>>,
}

impl<T: Entity> Record<T> {
    pub(crate) fn new(entity: T, repo: Weak<Repository<T>>) -> Self {
        Self { entity, repo }
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut T {
        &mut self.entity
    }

    pub fn into_inner(self) -> T {
        self.entity
    }

    pub fn id(&self) -> &str {
        &self.entity.base().id
    }

    pub fn is_new(&self) -> bool {
        self.entity.base().is_new()
    }

    pub fn is_persisted(&self) -> bool {
        self.entity.base().is_persisted()
    }

    pub fn is_deleted(&self) -> bool {
        self.entity.base().is_deleted()
    }

    pub fn save(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.save(ctx, &mut self.entity)
    }

    pub fn create(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.create(ctx, &mut self.entity)
    }

    pub fn update(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.update(ctx, &mut self.entity)
    }

    pub fn delete(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.delete(ctx, &mut self.entity)
    }

    pub fn hard_delete(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.hard_delete(ctx, &mut self.entity)
    }

    pub fn restore(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.restore(ctx, &mut self.entity)
    }

    /// Replaces the wrapped entity with the stored live row.
    pub fn reload(&mut self, ctx: &Context) -> RepoResult<()> {
        if self.is_new() {
            return Err(RepoError::NotPersisted { op: "reload" });
        }
        let fresh = self.repo()?.find_by_id(ctx, self.id())?;
        self.entity = fresh;
        Ok(())
    }

    pub fn touch(&mut self, ctx: &Context) -> RepoResult<()> {
        self.repo()?.touch(ctx, &mut self.entity)
    }

    fn repo(&self) -> RepoResult<Arc<Repository<T>>> {
        self.repo.upgrade().ok_or(RepoError::Detached)
    }
}
