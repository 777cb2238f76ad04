//! Fluent query-predicate builder.
//!
//! # Responsibility
//! - Accumulate filter, ordering, grouping and paging state.
//! - Render it to SQL with positional `?` arguments.
//!
//! # Invariants
//! - The soft-delete fragment is always the first WHERE fragment unless
//!   visibility was widened with `with_deleted`/`only_deleted`.
//! - Conditions and ordering render in insertion order.
//! - Column names and raw fragments are trusted SQL; values are always bound.

mod builder;

pub use builder::{Direction, Query, Statement};
pub(crate) use builder::normalize_page;
