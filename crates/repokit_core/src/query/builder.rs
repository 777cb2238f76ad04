//! Value-type query builder.

use crate::db::{IntoValue, Value};

const DEFAULT_PER_PAGE: i64 = 10;
const SOFT_DELETE_COLUMN: &str = "deleted_at";

/// Sort direction. Anything other than `ASC`/`DESC` parses as ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Rendered SQL and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Visibility {
    #[default]
    Live,
    All,
    OnlyDeleted,
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    sql: String,
    args: Vec<Value>,
}

/// Filter, ordering and paging state rendered against one table.
///
/// Each method consumes the builder and returns the updated value, so a
/// finished query can be cloned and reused without aliasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    columns: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<Fragment>,
    group_by: Vec<String>,
    having: Vec<Fragment>,
    order_by: Vec<(String, Direction)>,
    limit: Option<i64>,
    offset: Option<i64>,
    visibility: Visibility,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw condition. The fragment is parenthesized so `OR` inside it
    /// cannot leak into neighbouring conditions.
    pub fn where_raw(mut self, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        self.conditions.push(Fragment {
            sql: format!("({})", fragment.into()),
            args,
        });
        self
    }

    pub fn where_eq(self, column: &str, value: impl IntoValue) -> Self {
        self.push_condition(format!("{column} = ?"), vec![value.into_value()])
    }

    pub fn where_ne(self, column: &str, value: impl IntoValue) -> Self {
        self.push_condition(format!("{column} <> ?"), vec![value.into_value()])
    }

    /// `column IN (...)`; an empty list matches nothing.
    pub fn where_in<V, I>(self, column: &str, values: I) -> Self
    where
        V: IntoValue,
        I: IntoIterator<Item = V>,
    {
        let args: Vec<Value> = values.into_iter().map(IntoValue::into_value).collect();
        if args.is_empty() {
            return self.push_condition("1 = 0".to_string(), Vec::new());
        }
        let placeholders = vec!["?"; args.len()].join(", ");
        self.push_condition(format!("{column} IN ({placeholders})"), args)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(format!("{column} IS NULL"), Vec::new())
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_condition(format!("{column} IS NOT NULL"), Vec::new())
    }

    pub fn where_like(self, column: &str, pattern: impl IntoValue) -> Self {
        self.push_condition(format!("{column} LIKE ?"), vec![pattern.into_value()])
    }

    pub fn where_between(self, column: &str, low: impl IntoValue, high: impl IntoValue) -> Self {
        self.push_condition(
            format!("{column} BETWEEN ? AND ?"),
            vec![low.into_value(), high.into_value()],
        )
    }

    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        self.order_by
            .push((column.to_string(), Direction::parse(direction)));
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        self.having.push(Fragment {
            sql: format!("({})", fragment.into()),
            args,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 1-indexed paging; `page < 1` becomes 1 and `per_page < 1` becomes 10.
    pub fn paginate(self, page: i64, per_page: i64) -> Self {
        let (page, per_page) = normalize_page(page, per_page);
        self.limit(per_page)
            .offset((page - 1).saturating_mul(per_page))
    }

    /// Includes soft-deleted rows.
    pub fn with_deleted(mut self) -> Self {
        self.visibility = Visibility::All;
        self
    }

    /// Restricts the result to soft-deleted rows.
    pub fn only_deleted(mut self) -> Self {
        self.visibility = Visibility::OnlyDeleted;
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Appends a join clause verbatim, e.g. `JOIN owners ON owners.id = cats.owner_id`.
    pub fn join(mut self, fragment: impl Into<String>) -> Self {
        self.joins.push(fragment.into());
        self
    }

    /// Renders `SELECT ... FROM table ... WHERE ... GROUP BY ... HAVING ...
    /// ORDER BY ... LIMIT ? OFFSET ?`.
    pub fn build(&self, table: &str) -> Statement {
        let mut sql = String::from("SELECT ");
        if !self.columns.is_empty() {
            sql.push_str(&self.columns.join(", "));
        } else if self.joins.is_empty() {
            sql.push('*');
        } else {
            // Joined tables would otherwise shadow the entity's own columns.
            sql.push_str(table);
            sql.push_str(".*");
        }
        sql.push_str(" FROM ");
        sql.push_str(table);

        let mut args = Vec::new();
        self.push_joins(&mut sql);
        self.push_where(table, &mut sql, &mut args);
        self.push_grouping(&mut sql, &mut args);

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{column} {}", direction.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                args.push(Value::Integer(limit));
                args.push(Value::Integer(offset));
            }
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                args.push(Value::Integer(limit));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                args.push(Value::Integer(offset));
            }
            (None, None) => {}
        }

        Statement { sql, args }
    }

    /// Renders a `COUNT(*)` over the same rows, ignoring order and paging.
    pub fn build_count(&self, table: &str) -> Statement {
        let mut args = Vec::new();
        let mut inner = String::new();
        self.push_joins(&mut inner);
        self.push_where(table, &mut inner, &mut args);

        if self.group_by.is_empty() {
            return Statement {
                sql: format!("SELECT COUNT(*) FROM {table}{inner}"),
                args,
            };
        }

        self.push_grouping(&mut inner, &mut args);
        Statement {
            sql: format!("SELECT COUNT(*) FROM (SELECT 1 FROM {table}{inner}) AS grouped_rows"),
            args,
        }
    }

    /// Renders only the WHERE clause (with a leading space), or an empty
    /// string when there is nothing to filter. Joins are not rendered.
    pub fn build_where(&self, table: &str) -> Statement {
        let mut sql = String::new();
        let mut args = Vec::new();
        self.push_where(table, &mut sql, &mut args);
        Statement { sql, args }
    }

    /// Forces the default soft-delete scoping, whatever visibility was set.
    pub(crate) fn live_only(mut self) -> Self {
        self.visibility = Visibility::Live;
        self
    }

    fn push_condition(mut self, sql: String, args: Vec<Value>) -> Self {
        self.conditions.push(Fragment { sql, args });
        self
    }

    fn push_joins(&self, sql: &mut String) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
    }

    fn push_where(&self, table: &str, sql: &mut String, args: &mut Vec<Value>) {
        let column = if self.joins.is_empty() {
            SOFT_DELETE_COLUMN.to_string()
        } else {
            format!("{table}.{SOFT_DELETE_COLUMN}")
        };

        let mut fragments = Vec::with_capacity(self.conditions.len() + 1);
        match self.visibility {
            Visibility::Live => fragments.push(format!("{column} IS NULL")),
            Visibility::OnlyDeleted => fragments.push(format!("{column} IS NOT NULL")),
            Visibility::All => {}
        }
        for condition in &self.conditions {
            fragments.push(condition.sql.clone());
            args.extend(condition.args.iter().cloned());
        }

        if !fragments.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragments.join(" AND "));
        }
    }

    fn push_grouping(&self, sql: &mut String, args: &mut Vec<Value>) {
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            let having = self
                .having
                .iter()
                .map(|fragment| fragment.sql.as_str())
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" HAVING ");
            sql.push_str(&having);
            for fragment in &self.having {
                args.extend(fragment.args.iter().cloned());
            }
        }
    }
}

/// Applies the paging defaults shared by [`Query::paginate`] and page reads.
pub(crate) fn normalize_page(page: i64, per_page: i64) -> (i64, i64) {
    let page = page.max(1);
    let per_page = if per_page < 1 {
        DEFAULT_PER_PAGE
    } else {
        per_page
    };
    (page, per_page)
}

#[cfg(test)]
mod tests {
    use super::{Direction, Query};
    use crate::db::Value;

    #[test]
    fn empty_query_scopes_to_live_rows() {
        let statement = Query::new().build("cats");
        assert_eq!(statement.sql, "SELECT * FROM cats WHERE deleted_at IS NULL");
        assert!(statement.args.is_empty());
    }

    #[test]
    fn soft_delete_filter_comes_before_conditions() {
        let statement = Query::new()
            .where_eq("name", "Whiskers")
            .where_raw("age > ? OR indoor = ?", vec![Value::Integer(3), Value::Integer(1)])
            .build("cats");

        assert_eq!(
            statement.sql,
            "SELECT * FROM cats WHERE deleted_at IS NULL AND name = ? AND (age > ? OR indoor = ?)"
        );
        assert_eq!(
            statement.args,
            vec![
                Value::Text("Whiskers".to_string()),
                Value::Integer(3),
                Value::Integer(1)
            ]
        );
    }

    #[test]
    fn with_deleted_drops_filter_and_only_deleted_inverts_it() {
        assert_eq!(
            Query::new().with_deleted().build("cats").sql,
            "SELECT * FROM cats"
        );
        assert_eq!(
            Query::new()
                .only_deleted()
                .where_null("owner_id")
                .build("cats")
                .sql,
            "SELECT * FROM cats WHERE deleted_at IS NOT NULL AND owner_id IS NULL"
        );
    }

    #[test]
    fn full_select_renders_clauses_in_order() {
        let statement = Query::new()
            .select(["owner_id", "COUNT(*) AS total"])
            .where_between("age", 1, 9)
            .group_by(["owner_id"])
            .having("COUNT(*) > ?", vec![Value::Integer(1)])
            .order_by("total", "desc")
            .order_by("owner_id", "sideways")
            .limit(5)
            .offset(10)
            .build("cats");

        assert_eq!(
            statement.sql,
            "SELECT owner_id, COUNT(*) AS total FROM cats WHERE deleted_at IS NULL AND age BETWEEN ? AND ? \
             GROUP BY owner_id HAVING (COUNT(*) > ?) ORDER BY total DESC, owner_id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            statement.args,
            vec![
                Value::Integer(1),
                Value::Integer(9),
                Value::Integer(1),
                Value::Integer(5),
                Value::Integer(10)
            ]
        );
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let statement = Query::new().with_deleted().offset(20).build("cats");
        assert_eq!(statement.sql, "SELECT * FROM cats LIMIT -1 OFFSET ?");
        assert_eq!(statement.args, vec![Value::Integer(20)]);
    }

    #[test]
    fn paginate_normalizes_out_of_range_input() {
        assert_eq!(
            Query::new().paginate(0, 0),
            Query::new().limit(10).offset(0)
        );
        assert_eq!(
            Query::new().paginate(3, 25),
            Query::new().limit(25).offset(50)
        );
        assert_eq!(
            Query::new().paginate(i64::MAX, 1_000),
            Query::new().limit(1_000).offset(i64::MAX)
        );
    }

    #[test]
    fn where_in_binds_every_value_and_empty_list_matches_nothing() {
        let statement = Query::new().where_in("id", ["a", "b"]).build("cats");
        assert_eq!(
            statement.sql,
            "SELECT * FROM cats WHERE deleted_at IS NULL AND id IN (?, ?)"
        );
        assert_eq!(statement.args.len(), 2);

        let none = Query::new()
            .where_in("id", Vec::<String>::new())
            .build("cats");
        assert_eq!(
            none.sql,
            "SELECT * FROM cats WHERE deleted_at IS NULL AND 1 = 0"
        );
    }

    #[test]
    fn joins_qualify_soft_delete_column_and_star() {
        let statement = Query::new()
            .join("JOIN owners ON owners.id = cats.owner_id")
            .where_like("owners.name", "A%")
            .build("cats");
        assert_eq!(
            statement.sql,
            "SELECT cats.* FROM cats JOIN owners ON owners.id = cats.owner_id \
             WHERE cats.deleted_at IS NULL AND owners.name LIKE ?"
        );
    }

    #[test]
    fn count_ignores_order_and_paging_and_wraps_groups() {
        let plain = Query::new()
            .where_ne("name", "Tom")
            .order_by("name", "ASC")
            .paginate(2, 5)
            .build_count("cats");
        assert_eq!(
            plain.sql,
            "SELECT COUNT(*) FROM cats WHERE deleted_at IS NULL AND name <> ?"
        );
        assert_eq!(plain.args, vec![Value::Text("Tom".to_string())]);

        let grouped = Query::new().group_by(["owner_id"]).build_count("cats");
        assert_eq!(
            grouped.sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM cats WHERE deleted_at IS NULL GROUP BY owner_id) AS grouped_rows"
        );
    }

    #[test]
    fn build_where_is_forced_live_for_bulk_writes() {
        let statement = Query::new()
            .with_deleted()
            .where_eq("age", 2)
            .live_only()
            .build_where("cats");
        assert_eq!(statement.sql, " WHERE deleted_at IS NULL AND age = ?");
    }

    #[test]
    fn direction_parse_defaults_to_ascending() {
        assert_eq!(Direction::parse("DESC"), Direction::Desc);
        assert_eq!(Direction::parse(" desc "), Direction::Desc);
        assert_eq!(Direction::parse("ASC"), Direction::Asc);
        assert_eq!(Direction::parse("random"), Direction::Asc);
    }
}
