//! Entity lifecycle hooks.
//!
//! # Invariants
//! - Create runs `validate -> before_save -> before_create -> [insert] ->
//!   after_create -> after_save`.
//! - Update runs `validate -> before_save -> before_update -> [update] ->
//!   after_update -> after_save`.
//! - Soft and hard delete run `before_delete -> [delete] -> after_delete`.
//! - The first failing hook stops the chain and any write that has not run.
//!   Hooks that already ran are not undone here; callers that need that use a
//!   transaction.

use crate::db::Context;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

/// Optional lifecycle callbacks. Every method defaults to a no-op, so an
/// entity overrides only the ones it needs (`impl Hooks for Cat {}` opts out
/// of all of them).
pub trait Hooks {
    fn validate(&self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn before_save(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn after_save(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn before_create(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn after_create(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn before_update(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn after_update(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn before_delete(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    fn after_delete(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Runs once for every entity produced by a read.
    fn after_find(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }
}

/// Which write a hook chain wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    Create,
    Update,
    Delete,
}

pub(crate) fn run_before<T: Hooks + ?Sized>(
    entity: &mut T,
    ctx: &Context,
    kind: WriteKind,
) -> HookResult {
    match kind {
        WriteKind::Create => {
            entity.validate(ctx)?;
            entity.before_save(ctx)?;
            entity.before_create(ctx)
        }
        WriteKind::Update => {
            entity.validate(ctx)?;
            entity.before_save(ctx)?;
            entity.before_update(ctx)
        }
        WriteKind::Delete => entity.before_delete(ctx),
    }
}

pub(crate) fn run_after<T: Hooks + ?Sized>(
    entity: &mut T,
    ctx: &Context,
    kind: WriteKind,
) -> HookResult {
    match kind {
        WriteKind::Create => {
            entity.after_create(ctx)?;
            entity.after_save(ctx)
        }
        WriteKind::Update => {
            entity.after_update(ctx)?;
            entity.after_save(ctx)
        }
        WriteKind::Delete => entity.after_delete(ctx),
    }
}
