//! Query-wide predicate reduction.
//!
//! Binds parameters, expands folder path predicates once per query and folds
//! constants. Per-type pruning happens later in the planner on the reduced tree.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::access::{FolderPathExpander, IdSetHandle, RelationalAccess};
use crate::query::ast::{field_name, CompareOp, Expr, Operand, PATH_PROPERTY};
use crate::query::errors::QueryError;
use crate::query::statement::FolderSet;
use crate::query::Value;
use crate::types::Result;

/// Reduced predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
    /// Field comparison with a bound value.
    Compare {
        /// Field name without prefix.
        property: String,
        /// Operator.
        op: CompareOp,
        /// Bound value.
        value: Value,
    },
    /// Field is null.
    IsNull {
        /// Field name without prefix.
        property: String,
    },
    /// Item lives in one of the folders.
    InFolders(FolderSet),
    /// Constant truth value.
    Trivial(bool),
}

enum Simplified {
    True,
    False,
    Expr(Predicate),
}

impl Simplified {
    fn into_predicate(self) -> Predicate {
        match self {
            Simplified::True => Predicate::Trivial(true),
            Simplified::False => Predicate::Trivial(false),
            Simplified::Expr(p) => p,
        }
    }
}

impl Predicate {
    /// Folds constants and flattens nested connectives.
    pub fn simplify(self) -> Predicate {
        simplify(self).into_predicate()
    }

    /// Returns `Some(truth)` when the predicate is constant.
    pub fn as_trivial(&self) -> Option<bool> {
        match self {
            Predicate::Trivial(truth) => Some(*truth),
            _ => None,
        }
    }
}

fn simplify(pred: Predicate) -> Simplified {
    match pred {
        Predicate::Trivial(true) => Simplified::True,
        Predicate::Trivial(false) => Simplified::False,
        Predicate::Not(inner) => match simplify(*inner) {
            Simplified::True => Simplified::False,
            Simplified::False => Simplified::True,
            Simplified::Expr(Predicate::Not(grand)) => Simplified::Expr(*grand),
            Simplified::Expr(expr) => Simplified::Expr(Predicate::Not(Box::new(expr))),
        },
        Predicate::And(children) => {
            let mut flattened = Vec::new();
            for child in children {
                match simplify(child) {
                    Simplified::True => {}
                    Simplified::False => return Simplified::False,
                    Simplified::Expr(Predicate::And(grand)) => flattened.extend(grand),
                    Simplified::Expr(other) => flattened.push(other),
                }
            }
            match flattened.len() {
                0 => Simplified::True,
                1 => Simplified::Expr(flattened.remove(0)),
                _ => Simplified::Expr(Predicate::And(flattened)),
            }
        }
        Predicate::Or(children) => {
            let mut flattened = Vec::new();
            for child in children {
                match simplify(child) {
                    Simplified::False => {}
                    Simplified::True => return Simplified::True,
                    Simplified::Expr(Predicate::Or(grand)) => flattened.extend(grand),
                    Simplified::Expr(other) => flattened.push(other),
                }
            }
            match flattened.len() {
                0 => Simplified::False,
                1 => Simplified::Expr(flattened.remove(0)),
                _ => Simplified::Expr(Predicate::Or(flattened)),
            }
        }
        other => Simplified::Expr(other),
    }
}

/// Releases a temporary id set when dropped.
pub struct IdSetGuard<'a> {
    access: &'a dyn RelationalAccess,
    handle: IdSetHandle,
}

impl<'a> IdSetGuard<'a> {
    fn new(access: &'a dyn RelationalAccess, handle: IdSetHandle) -> Self {
        Self { access, handle }
    }

    /// Guarded handle.
    pub fn handle(&self) -> IdSetHandle {
        self.handle
    }
}

impl Drop for IdSetGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.access.release_id_set(self.handle) {
            warn!(set = self.handle.0, error = %err, "query.idset.release_failed");
        }
    }
}

/// Reduced predicate plus the temporary id sets it references.
///
/// The sets live exactly as long as this value.
pub struct Reduced<'a> {
    /// Reduced predicate.
    pub predicate: Predicate,
    id_sets: Vec<IdSetGuard<'a>>,
}

impl Reduced<'_> {
    /// Temporary id sets held.
    pub fn id_sets(&self) -> impl Iterator<Item = IdSetHandle> + '_ {
        self.id_sets.iter().map(IdSetGuard::handle)
    }
}

/// Binds, expands and folds a where-expression.
pub struct Reducer<'a> {
    access: &'a dyn RelationalAccess,
    folders: &'a dyn FolderPathExpander,
    params: &'a BTreeMap<String, Value>,
    max_inline_ids: usize,
    max_depth: usize,
}

impl<'a> Reducer<'a> {
    /// Creates a reducer.
    pub fn new(
        access: &'a dyn RelationalAccess,
        folders: &'a dyn FolderPathExpander,
        params: &'a BTreeMap<String, Value>,
        max_inline_ids: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            access,
            folders,
            params,
            max_inline_ids,
            max_depth,
        }
    }

    /// Reduces `filter`; an absent filter is trivially true.
    pub fn reduce(&self, filter: Option<&Expr>) -> Result<Reduced<'a>> {
        let mut id_sets = Vec::new();
        let predicate = match filter {
            None => Predicate::Trivial(true),
            Some(expr) => {
                let depth = expr.depth();
                if depth > self.max_depth {
                    return Err(QueryError::PredicateTooDeep {
                        depth,
                        max: self.max_depth,
                    }
                    .into());
                }
                self.reduce_expr(expr, &mut id_sets)?.simplify()
            }
        };
        debug!(trivial = ?predicate.as_trivial(), id_sets = id_sets.len(), "query.reduce");
        Ok(Reduced { predicate, id_sets })
    }

    fn reduce_expr(&self, expr: &Expr, id_sets: &mut Vec<IdSetGuard<'a>>) -> Result<Predicate> {
        Ok(match expr {
            Expr::Literal(Value::Bool(truth)) => Predicate::Trivial(*truth),
            Expr::Literal(other) => {
                return Err(QueryError::NonBooleanLiteral {
                    value: other.to_string(),
                }
                .into())
            }
            Expr::And(items) => Predicate::And(
                items
                    .iter()
                    .map(|e| self.reduce_expr(e, id_sets))
                    .collect::<Result<_>>()?,
            ),
            Expr::Or(items) => Predicate::Or(
                items
                    .iter()
                    .map(|e| self.reduce_expr(e, id_sets))
                    .collect::<Result<_>>()?,
            ),
            Expr::Not(inner) => Predicate::Not(Box::new(self.reduce_expr(inner, id_sets)?)),
            Expr::IsNull { property } => Predicate::IsNull {
                property: field_name(property).to_string(),
            },
            Expr::Compare {
                property,
                op,
                value,
            } => {
                let value = self.bind(value)?;
                if property == PATH_PROPERTY {
                    return self.expand_path(*op, &value, id_sets);
                }
                if value.is_null() {
                    return Err(QueryError::NullComparison {
                        property: property.clone(),
                    }
                    .into());
                }
                if *op == CompareOp::Like && value.as_str().is_none() {
                    return Err(QueryError::LikeRequiresString {
                        property: property.clone(),
                    }
                    .into());
                }
                Predicate::Compare {
                    property: field_name(property).to_string(),
                    op: *op,
                    value,
                }
            }
        })
    }

    fn bind(&self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Param(name) => {
                let key = name.strip_prefix('$').unwrap_or(name);
                self.params.get(key).cloned().ok_or_else(|| {
                    QueryError::UnboundParameter {
                        name: key.to_string(),
                    }
                    .into()
                })
            }
        }
    }

    fn expand_path(
        &self,
        op: CompareOp,
        value: &Value,
        id_sets: &mut Vec<IdSetGuard<'a>>,
    ) -> Result<Predicate> {
        let pattern = match (op, value.as_str()) {
            (CompareOp::Eq | CompareOp::Like, Some(pattern)) => pattern,
            _ => {
                return Err(QueryError::InvalidPathPredicate {
                    op: op.to_string(),
                }
                .into())
            }
        };
        let ids = self.folders.expand(pattern)?;
        debug!(pattern, folders = ids.len(), "query.path.expand");
        if ids.is_empty() {
            return Ok(Predicate::Trivial(false));
        }
        if ids.len() > self.max_inline_ids {
            let guard = IdSetGuard::new(self.access, self.access.create_id_set(&ids)?);
            let handle = guard.handle();
            id_sets.push(guard);
            return Ok(Predicate::InFolders(FolderSet::Temp(handle)));
        }
        Ok(Predicate::InFolders(FolderSet::Inline(ids)))
    }
}
