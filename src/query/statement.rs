//! Relational statements produced by the planner.
//!
//! A [`SelectStatement`] is structural: providers may execute it directly (as
//! the in-memory provider does) or use the rendered SQL text.

use std::fmt::Write as _;
use std::hash::Hasher;

use smallvec::SmallVec;
use xxhash_rust::xxh64::Xxh64;

use crate::access::IdSetHandle;
use crate::query::ast::{CompareOp, SortDirection};
use crate::query::Value;
use crate::types::{ContentTypeId, FolderId};

/// Column of an aliased table.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ColumnRef {
    /// Table alias.
    pub alias: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Creates a column reference.
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// Folder ids a path predicate matches.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FolderSet {
    /// Ids listed in the statement.
    Inline(Vec<FolderId>),
    /// Ids held in a provider-side temporary set.
    Temp(IdSetHandle),
}

/// Row filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Conjunction.
    And(Vec<Filter>),
    /// Disjunction.
    Or(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
    /// Column compared with a bind parameter.
    Compare {
        /// Compared column.
        column: ColumnRef,
        /// Operator.
        op: CompareOp,
        /// Parameter name in [`SelectStatement::params`].
        param: String,
    },
    /// Column is null.
    IsNull(ColumnRef),
    /// Folder column is in a folder set.
    InFolders {
        /// Folder id column.
        column: ColumnRef,
        /// Matching folders.
        set: FolderSet,
    },
    /// Constant comparison; `false` renders as `1 <> 1`.
    Constant(bool),
}

/// Aliased table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableRef {
    /// Table name.
    pub table: String,
    /// Alias.
    pub alias: String,
}

/// Inner join with equality conditions `(joined column, bound column)`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Join {
    /// Joined table.
    pub table: TableRef,
    /// Equality conditions.
    pub on: SmallVec<[(ColumnRef, ColumnRef); 2]>,
}

/// Projected expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectExpr {
    /// A column.
    Column(ColumnRef),
    /// Constant null; keeps the projection shape for types lacking the column.
    Null,
}

/// One projected output column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectItem {
    /// Expression.
    pub expr: SelectExpr,
    /// Output name.
    pub alias: String,
}

/// One sort key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderItem {
    /// Sorted column.
    pub column: ColumnRef,
    /// Direction.
    pub direction: SortDirection,
}

/// A per-type select statement.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    /// Content type the statement targets.
    pub type_id: ContentTypeId,
    /// Primary table.
    pub from: TableRef,
    /// Inner joins.
    pub joins: Vec<Join>,
    /// Row filter.
    pub filter: Filter,
    /// Output columns.
    pub projection: Vec<SelectItem>,
    /// Sort keys.
    pub order_by: Vec<OrderItem>,
    /// Collation of text sort keys.
    pub collation: Option<String>,
    /// Row limit hint.
    pub limit: Option<usize>,
    /// Bind parameters.
    pub params: Vec<(String, Value)>,
}

impl SelectStatement {
    /// Value bound to `name`.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Output column names.
    pub fn columns(&self) -> Vec<&str> {
        self.projection.iter().map(|i| i.alias.as_str()).collect()
    }

    /// Renders SQL text.
    pub fn render(&self) -> String {
        let mut sql = String::from("SELECT ");
        for (i, item) in self.projection.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            match &item.expr {
                SelectExpr::Column(c) => {
                    let _ = write!(sql, "{}.{}", c.alias, c.column);
                }
                SelectExpr::Null => sql.push_str("NULL"),
            }
            let _ = write!(sql, " AS {}", quote_ident(&item.alias));
        }
        let _ = write!(sql, " FROM {} {}", self.from.table, self.from.alias);
        for join in &self.joins {
            let _ = write!(sql, " INNER JOIN {} {} ON ", join.table.table, join.table.alias);
            for (i, (left, right)) in join.on.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                let _ = write!(
                    sql,
                    "{}.{} = {}.{}",
                    left.alias, left.column, right.alias, right.column
                );
            }
        }
        sql.push_str(" WHERE ");
        render_filter(&self.filter, &mut sql);
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, item) in self.order_by.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let _ = write!(sql, "{}.{}", item.column.alias, item.column.column);
                if let Some(collation) = &self.collation {
                    let _ = write!(sql, " COLLATE {}", quote_ident(collation));
                }
                sql.push_str(match item.direction {
                    SortDirection::Asc => " ASC",
                    SortDirection::Desc => " DESC",
                });
            }
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }

    /// Shape fingerprint: SQL text plus parameter names and types, not values.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write(self.render().as_bytes());
        hasher.write_u64(self.params.len() as u64);
        for (name, value) in &self.params {
            hasher.write(name.as_bytes());
            hasher.write(value.type_name().as_bytes());
        }
        hasher.finish()
    }
}

/// Double-quoted SQL identifier; embedded quotes are doubled.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns `true` for locale names usable as a collation:
/// ASCII letters, digits, `_`, `.` and `-`.
pub fn is_collation_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

fn render_filter(filter: &Filter, sql: &mut String) {
    match filter {
        Filter::And(items) | Filter::Or(items) if items.is_empty() => {
            let truth = matches!(filter, Filter::And(_));
            render_filter(&Filter::Constant(truth), sql);
        }
        Filter::And(items) | Filter::Or(items) => {
            let sep = if matches!(filter, Filter::And(_)) {
                " AND "
            } else {
                " OR "
            };
            sql.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    sql.push_str(sep);
                }
                render_filter(item, sql);
            }
            sql.push(')');
        }
        Filter::Not(inner) => {
            sql.push_str("NOT ");
            render_filter(inner, sql);
        }
        Filter::Compare { column, op, param } => {
            let _ = write!(sql, "{}.{} {} :{}", column.alias, column.column, op, param);
        }
        Filter::IsNull(column) => {
            let _ = write!(sql, "{}.{} IS NULL", column.alias, column.column);
        }
        Filter::InFolders { column, set } => match set {
            FolderSet::Inline(ids) if ids.is_empty() => sql.push_str("1 <> 1"),
            FolderSet::Inline(ids) => {
                let _ = write!(sql, "{}.{} IN (", column.alias, column.column);
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    let _ = write!(sql, "{id}");
                }
                sql.push(')');
            }
            FolderSet::Temp(handle) => {
                let _ = write!(
                    sql,
                    "{}.{} IN (SELECT ID FROM TEMP_IDS WHERE SETID = {})",
                    column.alias, column.column, handle.0
                );
            }
        },
        Filter::Constant(true) => sql.push_str("1 = 1"),
        Filter::Constant(false) => sql.push_str("1 <> 1"),
    }
}

/// SQL `LIKE` matching: `%` matches any run, `_` one character.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
