//! Query execution pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::access::{FolderPathExpander, RelationalAccess};
use crate::catalog::{DescriptorRegistry, RegistryView};
use crate::query::ast::{NodeQuery, ANY_TYPE, PROPERTY_PREFIX};
use crate::query::errors::QueryError;
use crate::query::planner::{PlanRequest, TypePlanner};
use crate::query::predicate::Reducer;
use crate::query::statement::is_collation_name;
use crate::query::Value;
use crate::schema::{ObjectKind, PropertyType, SystemFields, TypeDescriptor, FOLDER_ID_FIELD};
use crate::types::{ContentTypeId, RepoError, Result};

/// Tunables of the query pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueryOptions {
    /// Folder id lists longer than this go through a temporary id set.
    pub max_inline_ids: usize,
    /// Maximum where-expression nesting.
    pub max_predicate_depth: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_inline_ids: 100,
            max_predicate_depth: 64,
        }
    }
}

/// One result row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRow {
    /// Content type that produced the row.
    pub content_type: ContentTypeId,
    /// Values in column order.
    pub values: Vec<Value>,
}

/// Statement executed for one content type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    /// Content type.
    pub content_type: ContentTypeId,
    /// Rendered SQL.
    pub sql: String,
    /// Shape fingerprint.
    pub fingerprint: u64,
    /// Whether the predicate was provably empty.
    pub degenerate: bool,
}

/// Merged query result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Output column names.
    pub columns: Vec<String>,
    /// Rows in per-type then per-row order.
    pub rows: Vec<QueryRow>,
    /// Executed statements.
    pub plans: Vec<PlanInfo>,
}

impl QueryResult {
    /// Position of `column`.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of `column` across rows.
    pub fn column(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().map(|r| &r.values[idx]).collect(),
            None => Vec::new(),
        }
    }
}

/// Translates node queries into per-type statements and merges their rows.
pub struct QueryEngine {
    registry: Arc<DescriptorRegistry>,
    access: Arc<dyn RelationalAccess>,
    folders: Arc<dyn FolderPathExpander>,
    system: Arc<SystemFields>,
    options: QueryOptions,
}

impl QueryEngine {
    /// Creates an engine.
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        access: Arc<dyn RelationalAccess>,
        folders: Arc<dyn FolderPathExpander>,
        system: Arc<SystemFields>,
        options: QueryOptions,
    ) -> Self {
        Self {
            registry,
            access,
            folders,
            system,
            options,
        }
    }

    /// Executes `query` under the registry's shared lock.
    pub fn execute(&self, query: &NodeQuery) -> Result<QueryResult> {
        let view = self.registry.view();
        let targets = self.targets(&view, query)?;
        if let Some(locale) = query.locale.as_deref() {
            if !is_collation_name(locale) {
                return Err(QueryError::InvalidCollation {
                    locale: locale.to_string(),
                }
                .into());
            }
        }
        let reducer = Reducer::new(
            self.access.as_ref(),
            self.folders.as_ref(),
            &query.params,
            self.options.max_inline_ids,
            self.options.max_predicate_depth,
        );
        let reduced = reducer.reduce(query.filter.as_ref())?;

        let columns = if query.columns.is_empty() {
            self.default_projection(&targets)
        } else {
            query.columns.clone()
        };
        let limit = query.max_results.filter(|n| *n > 0);
        let request = PlanRequest {
            columns: &columns,
            order_by: &query.order_by,
            collation: query.locale.as_deref(),
            limit,
        };
        let planner = TypePlanner::new(&self.system);
        let mut result = QueryResult {
            columns: columns.iter().map(|c| external_name(c)).collect(),
            ..QueryResult::default()
        };
        for desc in &targets {
            let plan = planner.plan(desc, &reduced.predicate, &request)?;
            let fingerprint = plan.statement.fingerprint();
            let rows = self.access.query(&plan.statement)?;
            debug!(
                content_type = %plan.type_id,
                fingerprint,
                rows = rows.len(),
                degenerate = plan.degenerate,
                "query.type.execute"
            );
            result.plans.push(PlanInfo {
                content_type: plan.type_id,
                sql: plan.statement.render(),
                fingerprint,
                degenerate: plan.degenerate,
            });
            result
                .rows
                .extend(rows.into_iter().map(|values| QueryRow {
                    content_type: plan.type_id,
                    values,
                }));
        }
        if let Some(limit) = limit {
            result.rows.truncate(limit);
        }
        info!(
            types = targets.len(),
            rows = result.rows.len(),
            epoch = view.epoch(),
            "query.execute"
        );
        Ok(result)
    }

    fn targets(&self, view: &RegistryView<'_>, query: &NodeQuery) -> Result<Vec<Arc<TypeDescriptor>>> {
        if query.is_wildcard() {
            return Ok(view
                .parents(ObjectKind::Item)
                .into_iter()
                .filter(|desc| {
                    if desc.is_dead() {
                        warn!(content_type = %desc.key(), "query.type.skip_dead");
                        return false;
                    }
                    true
                })
                .cloned()
                .collect());
        }
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for name in query.types.iter().filter(|t| *t != ANY_TYPE) {
            let Some(desc) = view.find_parent_by_name(name) else {
                warn!(type_name = %name, "query.type.skip");
                continue;
            };
            if desc.is_dead() {
                return Err(RepoError::UnknownContentType(desc.key().content_type));
            }
            if seen.insert(desc.key()) {
                out.push(Arc::clone(desc));
            }
        }
        Ok(out)
    }

    /// System fields, then the sorted union of single-valued non-binary fields.
    fn default_projection(&self, targets: &[Arc<TypeDescriptor>]) -> Vec<String> {
        let mut columns: Vec<String> = self.system.iter().map(|f| f.name.clone()).collect();
        let fields: BTreeSet<&str> = targets
            .iter()
            .flat_map(|d| d.fields())
            .filter(|f| f.ty != PropertyType::LargeBinary)
            .filter(|f| self.system.get(&f.name).is_none())
            .map(|f| f.name.as_str())
            .collect();
        columns.extend(fields.into_iter().map(|f| format!("{PROPERTY_PREFIX}{f}")));
        columns
    }
}

/// Externally visible column name.
fn external_name(column: &str) -> String {
    if column == FOLDER_ID_FIELD {
        format!("{PROPERTY_PREFIX}{FOLDER_ID_FIELD}")
    } else {
        column.to_string()
    }
}
