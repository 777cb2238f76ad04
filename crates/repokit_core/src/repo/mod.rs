//! Generic repositories over [`crate::model::Entity`] types.
//!
//! # Responsibility
//! - Map entities to rows through a per-type cached [`EntityMapping`].
//! - Run lifecycle hooks around single-entity writes.
//! - Translate driver failures into semantic [`RepoError`] values.
//!
//! # Invariants
//! - Every managed table has `id`, `created_at`, `updated_at` and `deleted_at`.
//! - Default reads never return soft-deleted rows.
//! - `NotFound` covers both a missing id and a soft-deleted row.

mod error;
mod mapping;
mod record;
mod repository;
mod store;
mod tx_repo;

pub use error::{RepoError, RepoResult};
pub(crate) use mapping::is_identifier;
pub use mapping::EntityMapping;
pub use record::Record;
pub use repository::Repository;
pub use store::{EntityStore, Page};
pub use tx_repo::TxRepository;
