//! Entity contract and the `entity!` declaration macro.

use super::base::BaseEntity;
use super::hooks::Hooks;
use crate::db::{DbError, DbResult, Row, Value};
use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;

/// A type persisted as one row of a managed table.
///
/// Implementations are normally generated by [`crate::entity!`]. The table
/// must contain the [`BaseEntity::COLUMNS`] plus every mapped column.
pub trait Entity: Hooks + Default + Send + Sync + 'static {
    /// Table name; defaults to the snake_case plural of the type name.
    fn table_name() -> String {
        default_table_name::<Self>()
    }

    /// Mapped columns in a fixed order, excluding the base columns.
    fn columns() -> &'static [&'static str];

    fn base(&self) -> &BaseEntity;

    fn base_mut(&mut self) -> &mut BaseEntity;

    /// Values of the mapped fields, aligned with [`Entity::columns`].
    fn to_values(&self) -> DbResult<Vec<Value>>;

    /// Builds an entity from a row containing base and mapped columns.
    fn from_row(row: &Row) -> DbResult<Self>;
}

/// Converts any `ToSql` field into an owned value.
pub fn to_value<T: ToSql + ?Sized>(field: &T) -> DbResult<Value> {
    match field.to_sql()? {
        ToSqlOutput::Borrowed(value) => Ok(value.into()),
        ToSqlOutput::Owned(value) => Ok(value),
        #[allow(unreachable_patterns)]
        _ => Err(DbError::Sqlite(rusqlite::Error::ToSqlConversionFailure(
            "field does not convert to a plain SQL value".into(),
        ))),
    }
}

/// Derives `blog_posts` from `my_app::models::BlogPost`.
pub fn default_table_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    let short = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);

    let mut snake = String::with_capacity(short.len() + 4);
    for (idx, ch) in short.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if idx > 0 {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
        } else {
            snake.push(ch);
        }
    }
    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(&['a', 'e', 'i', 'o', 'u'][..]) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// Implements [`Entity`] for a struct from an explicit field => column list.
///
/// The struct must implement `Default` and [`crate::Hooks`] and embed a
/// [`crate::BaseEntity`] field.
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Cat {
///     base: BaseEntity,
///     name: String,
///     age: i64,
/// }
///
/// impl Hooks for Cat {}
///
/// repokit_core::entity!(Cat {
///     table: "cats",
///     base: base,
///     columns: { name => "name", age => "age" },
/// });
/// ```
#[macro_export]
macro_rules! entity {
    (
        $ty:ty {
            $(table: $table:expr,)?
            base: $base:ident,
            columns: { $($field:ident => $column:literal),* $(,)? } $(,)?
        }
    ) => {
        impl $crate::model::Entity for $ty {
            $(
                fn table_name() -> ::std::string::String {
                    ::std::string::String::from($table)
                }
            )?

            fn columns() -> &'static [&'static str] {
                &[$($column),*]
            }

            fn base(&self) -> &$crate::model::BaseEntity {
                &self.$base
            }

            fn base_mut(&mut self) -> &mut $crate::model::BaseEntity {
                &mut self.$base
            }

            fn to_values(&self) -> $crate::db::DbResult<::std::vec::Vec<$crate::db::Value>> {
                ::std::result::Result::Ok(::std::vec![
                    $($crate::model::to_value(&self.$field)?),*
                ])
            }

            fn from_row(row: &$crate::db::Row) -> $crate::db::DbResult<Self> {
                #[allow(unused_mut)]
                let mut entity = <Self as ::std::default::Default>::default();
                entity.$base = $crate::model::BaseEntity::from_row(row)?;
                $(entity.$field = row.get($column)?;)*
                ::std::result::Result::Ok(entity)
            }
        }
    };
}
