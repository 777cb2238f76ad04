//! Persistent-entity base type, entity contract and lifecycle hooks.
//!
//! # Responsibility
//! - Define the identity/audit fields shared by every managed table.
//! - Define the declarative field-to-column contract repositories rely on.
//!
//! # Invariants
//! - `id == ""` if and only if the entity has never been persisted.
//! - `deleted_at.is_some()` if and only if the entity is soft-deleted.
//! - Column mappings are explicit and fixed for the lifetime of a type.

mod base;
mod entity;
pub mod hooks;

pub use base::BaseEntity;
pub use entity::{default_table_name, to_value, Entity};
pub use hooks::{HookError, HookResult, Hooks};
