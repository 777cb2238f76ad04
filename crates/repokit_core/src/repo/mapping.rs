//! Per-type table/column mapping, validated once and cached.

use super::error::{RepoError, RepoResult};
use crate::model::{BaseEntity, Entity};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid identifier regex")
});

static MAPPINGS: Lazy<RwLock<HashMap<TypeId, Arc<EntityMapping>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Table name, column list and the fixed write statements for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMapping {
    table: String,
    columns: Vec<&'static str>,
    insert_sql: String,
    update_sql: String,
}

impl EntityMapping {
    /// Returns the cached mapping for `T`, building and validating it on first use.
    pub fn of<T: Entity>() -> RepoResult<Arc<Self>> {
        let key = TypeId::of::<T>();
        if let Some(found) = MAPPINGS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(found));
        }

        let mapping = Arc::new(Self::build(T::table_name(), T::columns())?);
        let mut cache = MAPPINGS.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(key).or_insert(mapping)))
    }

    fn build(table: String, columns: &'static [&'static str]) -> RepoResult<Self> {
        if !is_identifier(&table) {
            return Err(RepoError::InvalidModel(format!(
                "table name `{table}` is not a plain identifier"
            )));
        }

        let mut seen = HashSet::new();
        for column in columns {
            if !is_identifier(column) {
                return Err(RepoError::InvalidModel(format!(
                    "column `{column}` on `{table}` is not a plain identifier"
                )));
            }
            if BaseEntity::COLUMNS.contains(column) {
                return Err(RepoError::InvalidModel(format!(
                    "column `{column}` on `{table}` is managed by the base entity"
                )));
            }
            if !seen.insert(*column) {
                return Err(RepoError::InvalidModel(format!(
                    "column `{column}` is mapped twice on `{table}`"
                )));
            }
        }

        let all_columns: Vec<&str> = BaseEntity::COLUMNS
            .iter()
            .chain(columns.iter())
            .copied()
            .collect();
        let insert_sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            all_columns.join(", "),
            vec!["?"; all_columns.len()].join(", ")
        );

        let assignments: Vec<String> = std::iter::once("updated_at")
            .chain(columns.iter().copied())
            .map(|column| format!("{column} = ?"))
            .collect();
        let update_sql = format!(
            "UPDATE {table} SET {} WHERE id = ? AND deleted_at IS NULL",
            assignments.join(", ")
        );

        Ok(Self {
            table,
            columns: columns.to_vec(),
            insert_sql,
            update_sql,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Mapped columns, excluding the base columns.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Binds base values then mapped values.
    pub(crate) fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    /// Binds `updated_at`, mapped values, then `id`.
    pub(crate) fn update_sql(&self) -> &str {
        &self.update_sql
    }
}

pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}
