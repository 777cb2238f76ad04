//! Identity and audit fields embedded in every entity.

use crate::db::{DbResult, IntoValue, Row, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared identity/audit fields.
///
/// `id`, `created_at` and `updated_at` are assigned by the repository right
/// before the first insert; callers normally only read them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseEntity {
    /// UUID text; empty until the entity is first created.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BaseEntity {
    /// Base columns in insert order. Every managed table must have them.
    pub const COLUMNS: [&'static str; 4] = ["id", "created_at", "updated_at", "deleted_at"];

    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_persisted(&self) -> bool {
        !self.is_new()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Bound values aligned with [`BaseEntity::COLUMNS`].
    pub fn values(&self) -> Vec<Value> {
        vec![
            self.id.as_str().into_value(),
            self.created_at.into_value(),
            self.updated_at.into_value(),
            self.deleted_at.into_value(),
        ]
    }

    pub fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }
}
