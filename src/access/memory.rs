//! In-process relational provider used for tests or prototyping.
//!
//! Tables are vectors of column maps. Statements are evaluated structurally:
//! inner joins bind the first matching row, filters use SQL three-valued logic,
//! and rows are sorted and limited as the statement asks.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{
    ContentChangeEvent, ContentChangeSink, ContentSummary, FolderPathExpander, IdSetHandle,
    MappingInstaller, RelationalAccess,
};
use crate::query::ast::{CompareOp, SortDirection};
use crate::query::statement::{like_match, ColumnRef, Filter, FolderSet, SelectExpr, SelectStatement};
use crate::query::Value;
use crate::schema::{
    ObjectKind, CONTENT_ID_COLUMN, CURRENT_REVISION_COLUMN, REVISION_COLUMN, SUMMARY_TABLE,
    SYS_ID_COLUMN,
};
use crate::synth::{Association, RowClass, RowHandle};
use crate::types::{ContentTypeId, FolderId, Guid, RepoError, Result};

const CONTENT_TYPE_COLUMN: &str = "CONTENTTYPEID";
const TITLE_COLUMN: &str = "TITLE";
const OBJECT_TYPE_COLUMN: &str = "OBJECTTYPE";
const FOLDER_COLUMN: &str = "FOLDERID";

type Row = BTreeMap<String, Value>;
type Env<'a> = HashMap<&'a str, &'a Row>;

/// Cache eviction recorded by [`InMemoryAccess`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Eviction {
    /// One entity.
    Entity {
        /// Class name.
        class: String,
        /// Entity identity.
        id: Guid,
    },
    /// Every entity of a class.
    Class(String),
    /// One collection.
    Collection {
        /// Collection role, `<class>.<property>`.
        role: String,
        /// Owning item.
        owner: Guid,
    },
    /// One summary.
    Summary(i64),
}

/// Row or child load recorded by [`InMemoryAccess`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowRequest {
    /// Class name.
    pub class: String,
    /// Requested fields; `None` for every field.
    pub fields: Option<Vec<String>>,
}

/// Counters exposed by [`InMemoryAccess`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessStats {
    /// Statements executed.
    pub queries: u64,
    /// Row, child and collection load calls.
    pub row_loads: u64,
    /// Mapping installations.
    pub installs: u64,
    /// Currently installed classes.
    pub installed_classes: usize,
    /// Temporary id sets ever created.
    pub id_sets_created: u64,
    /// Temporary id sets not yet released.
    pub live_id_sets: usize,
}

/// In-memory [`RelationalAccess`] implementation.
#[derive(Default)]
pub struct InMemoryAccess {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    installed: RwLock<HashMap<String, Arc<RowClass>>>,
    id_sets: Mutex<HashMap<u64, Vec<FolderId>>>,
    next_id_set: AtomicU64,
    evictions: Mutex<Vec<Eviction>>,
    row_requests: Mutex<Vec<RowRequest>>,
    fail_install: Mutex<Option<String>>,
    fail_queries: AtomicBool,
    queries: AtomicU64,
    row_loads: AtomicU64,
    installs: AtomicU64,
}

impl InMemoryAccess {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row to `table`.
    pub fn insert_row<K, V>(&self, table: &str, cells: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let row: Row = cells
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Appends a summary row.
    pub fn insert_summary(&self, summary: &ContentSummary) {
        let folder = summary
            .folder_id
            .map_or(Value::Null, |f| Value::Long(f.0));
        self.insert_row(
            SUMMARY_TABLE,
            [
                (CONTENT_ID_COLUMN, Value::Long(summary.content_id)),
                (CONTENT_TYPE_COLUMN, Value::Long(summary.content_type.0)),
                (TITLE_COLUMN, Value::String(summary.title.clone())),
                (OBJECT_TYPE_COLUMN, Value::Long(summary.object_kind.code())),
                (
                    CURRENT_REVISION_COLUMN,
                    Value::Long(i64::from(summary.current_revision)),
                ),
                (FOLDER_COLUMN, folder),
            ],
        );
    }

    /// Rows currently stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// Installed class by name.
    pub fn installed_class(&self, name: &str) -> Option<Arc<RowClass>> {
        self.installed.read().get(name).cloned()
    }

    /// Evictions recorded so far.
    pub fn evictions(&self) -> Vec<Eviction> {
        self.evictions.lock().clone()
    }

    /// Row and child loads served so far.
    pub fn row_requests(&self) -> Vec<RowRequest> {
        self.row_requests.lock().clone()
    }

    /// Makes the next installation fail with `message`.
    pub fn fail_next_install(&self, message: impl Into<String>) {
        *self.fail_install.lock() = Some(message.into());
    }

    /// Makes every statement fail while set.
    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::Release);
    }

    /// Counters.
    pub fn stats(&self) -> AccessStats {
        AccessStats {
            queries: self.queries.load(Ordering::Acquire),
            row_loads: self.row_loads.load(Ordering::Acquire),
            installs: self.installs.load(Ordering::Acquire),
            installed_classes: self.installed.read().len(),
            id_sets_created: self.next_id_set.load(Ordering::Acquire),
            live_id_sets: self.id_sets.lock().len(),
        }
    }

    fn installed_for(&self, class: &RowClass) -> Result<Arc<RowClass>> {
        self.installed.read().get(&class.name).cloned().ok_or_else(|| {
            RepoError::repository(format!("no mapping installed for class {}", class.name))
        })
    }

    fn record_request(&self, class: &RowClass, fields: Option<&[&str]>) {
        self.row_loads.fetch_add(1, Ordering::AcqRel);
        self.row_requests.lock().push(RowRequest {
            class: class.name.clone(),
            fields: fields.map(|f| f.iter().map(|name| name.to_string()).collect()),
        });
    }

    fn fill(
        &self,
        tables: &HashMap<String, Vec<Row>>,
        handle: &mut RowHandle,
        primary: &Row,
        fields: Option<&[&str]>,
    ) {
        let class = Arc::clone(handle.class());
        let owner = handle.identity().owner();
        for field in &class.fields {
            if fields.is_some_and(|wanted| !wanted.contains(&field.name.as_str())) {
                continue;
            }
            let value = if field.table == class.mapping.table {
                primary.get(&field.column).cloned()
            } else {
                find_row(tables, &field.table, owner).and_then(|row| row.get(&field.column).cloned())
            };
            handle.set(field.name.clone(), value.unwrap_or(Value::Null));
        }
    }
}

fn long_at(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_long)
}

fn owned_by(row: &Row, owner: Guid) -> bool {
    long_at(row, CONTENT_ID_COLUMN) == Some(owner.content_id)
        && long_at(row, REVISION_COLUMN) == Some(i64::from(owner.revision))
}

fn find_row<'a>(tables: &'a HashMap<String, Vec<Row>>, table: &str, id: Guid) -> Option<&'a Row> {
    tables.get(table)?.iter().find(|row| {
        owned_by(row, id)
            && id
                .sys_id
                .map_or(true, |sys| long_at(row, SYS_ID_COLUMN) == Some(sys))
    })
}

fn lookup<'a>(env: &Env<'a>, column: &ColumnRef) -> Option<&'a Value> {
    let row: &'a Row = env.get(column.alias.as_str()).copied()?;
    row.get(&column.column)
}

fn eval(
    filter: &Filter,
    env: &Env<'_>,
    stmt: &SelectStatement,
    id_sets: &HashMap<u64, Vec<FolderId>>,
) -> Option<bool> {
    match filter {
        Filter::And(items) => {
            let mut result = Some(true);
            for item in items {
                match eval(item, env, stmt, id_sets) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        Filter::Or(items) => {
            let mut result = Some(false);
            for item in items {
                match eval(item, env, stmt, id_sets) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        Filter::Not(inner) => eval(inner, env, stmt, id_sets).map(|b| !b),
        Filter::Compare { column, op, param } => {
            let left = lookup(env, column)?;
            let right = stmt.param(param)?;
            if left.is_null() || right.is_null() {
                return None;
            }
            if *op == CompareOp::Like {
                return Some(like_match(left.as_str()?, right.as_str()?));
            }
            let ord = left.compare(right, None)?;
            Some(match op {
                CompareOp::Eq => ord == CmpOrdering::Equal,
                CompareOp::Ne => ord != CmpOrdering::Equal,
                CompareOp::Lt => ord == CmpOrdering::Less,
                CompareOp::Le => ord != CmpOrdering::Greater,
                CompareOp::Gt => ord == CmpOrdering::Greater,
                CompareOp::Ge | CompareOp::Like => ord != CmpOrdering::Less,
            })
        }
        Filter::IsNull(column) => Some(lookup(env, column).map_or(true, Value::is_null)),
        Filter::InFolders { column, set } => {
            let folder = lookup(env, column)?.as_long()?;
            let ids = match set {
                FolderSet::Inline(ids) => ids.as_slice(),
                FolderSet::Temp(handle) => id_sets.get(&handle.0)?.as_slice(),
            };
            Some(ids.iter().any(|id| id.0 == folder))
        }
        Filter::Constant(truth) => Some(*truth),
    }
}

fn compare_sort_values(a: Option<&Value>, b: Option<&Value>, collation: Option<&str>) -> CmpOrdering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(a), Some(b)) => a.compare(b, collation).unwrap_or(CmpOrdering::Equal),
    }
}

impl MappingInstaller for InMemoryAccess {
    fn install(&self, classes: &[Arc<RowClass>]) -> Result<()> {
        if let Some(message) = self.fail_install.lock().take() {
            return Err(RepoError::repository(message));
        }
        let mut installed = self.installed.write();
        installed.clear();
        for class in classes {
            installed.insert(class.name.clone(), Arc::clone(class));
        }
        self.installs.fetch_add(1, Ordering::AcqRel);
        debug!(classes = classes.len(), "memory.install");
        Ok(())
    }
}

impl RelationalAccess for InMemoryAccess {
    fn query(&self, stmt: &SelectStatement) -> Result<Vec<Vec<Value>>> {
        self.queries.fetch_add(1, Ordering::AcqRel);
        if self.fail_queries.load(Ordering::Acquire) {
            return Err(RepoError::repository("statement execution failed"));
        }
        trace!(sql = %stmt.render(), "memory.query");
        let tables = self.tables.read();
        let id_sets = self.id_sets.lock();
        let empty = Vec::new();
        let mut matched: Vec<Env<'_>> = Vec::new();
        'rows: for row in tables.get(&stmt.from.table).unwrap_or(&empty) {
            let mut env: Env<'_> = HashMap::new();
            env.insert(stmt.from.alias.as_str(), row);
            for join in &stmt.joins {
                let candidates = tables.get(&join.table.table).unwrap_or(&empty);
                let found = candidates.iter().find(|cand| {
                    join.on.iter().all(|(joined, bound)| {
                        match (cand.get(&joined.column), lookup(&env, bound)) {
                            (Some(a), Some(b)) => a.compare(b, None) == Some(CmpOrdering::Equal),
                            _ => false,
                        }
                    })
                });
                match found {
                    Some(cand) => {
                        env.insert(join.table.alias.as_str(), cand);
                    }
                    None => continue 'rows,
                }
            }
            if eval(&stmt.filter, &env, stmt, &id_sets) == Some(true) {
                matched.push(env);
            }
        }
        let collation = stmt.collation.as_deref();
        matched.sort_by(|a, b| {
            for item in &stmt.order_by {
                let ord = compare_sort_values(
                    lookup(a, &item.column),
                    lookup(b, &item.column),
                    collation,
                );
                let ord = match item.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            CmpOrdering::Equal
        });
        if let Some(limit) = stmt.limit {
            matched.truncate(limit);
        }
        Ok(matched
            .iter()
            .map(|env| {
                stmt.projection
                    .iter()
                    .map(|item| match &item.expr {
                        SelectExpr::Column(column) => {
                            lookup(env, column).cloned().unwrap_or(Value::Null)
                        }
                        SelectExpr::Null => Value::Null,
                    })
                    .collect()
            })
            .collect())
    }

    fn load_rows(
        &self,
        class: &RowClass,
        ids: &[Guid],
        fields: Option<&[&str]>,
    ) -> Result<Vec<RowHandle>> {
        self.record_request(class, fields);
        let class = self.installed_for(class)?;
        let tables = self.tables.read();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(primary) = find_row(&tables, &class.mapping.table, *id) else {
                trace!(class = %class.name, id = %id, "memory.load.miss");
                continue;
            };
            let mut handle = RowHandle::new(Arc::clone(&class), *id);
            self.fill(&tables, &mut handle, primary, fields);
            out.push(handle);
        }
        Ok(out)
    }

    fn load_children(
        &self,
        class: &RowClass,
        owners: &[Guid],
        fields: Option<&[&str]>,
    ) -> Result<Vec<RowHandle>> {
        self.record_request(class, fields);
        let class = self.installed_for(class)?;
        let tables = self.tables.read();
        let rank = class
            .mapping
            .sort_rank
            .clone()
            .unwrap_or_else(|| SYS_ID_COLUMN.to_string());
        let mut out = Vec::new();
        for owner in owners {
            let mut rows: Vec<&Row> = tables
                .get(&class.mapping.table)
                .map(|rows| rows.iter().filter(|r| owned_by(r, *owner)).collect())
                .unwrap_or_default();
            rows.sort_by(|a, b| compare_sort_values(a.get(&rank), b.get(&rank), None));
            for row in rows {
                let Some(sys_id) = long_at(row, SYS_ID_COLUMN) else {
                    continue;
                };
                let id = Guid::child_row(owner.content_id, owner.revision, sys_id);
                let mut handle = RowHandle::new(Arc::clone(&class), id);
                self.fill(&tables, &mut handle, row, fields);
                out.push(handle);
            }
        }
        Ok(out)
    }

    fn load_collection(&self, class: &RowClass, property: &str, owner: Guid) -> Result<Vec<Value>> {
        self.row_loads.fetch_add(1, Ordering::AcqRel);
        let class = self.installed_for(class)?;
        let bag = class.mapping.associations.iter().find_map(|a| match a {
            Association::Bag {
                property: name,
                table,
                column,
                ..
            } if name == property => Some((table, column)),
            _ => None,
        });
        let Some((table, column)) = bag else {
            return Err(RepoError::repository(format!(
                "class {} has no collection {property}",
                class.name
            )));
        };
        let tables = self.tables.read();
        let mut rows: Vec<&Row> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| owned_by(r, owner)).collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| compare_sort_values(a.get(SYS_ID_COLUMN), b.get(SYS_ID_COLUMN), None));
        Ok(rows
            .into_iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    fn load_summaries(&self, content_ids: &[i64]) -> Result<Vec<ContentSummary>> {
        let tables = self.tables.read();
        let Some(rows) = tables.get(SUMMARY_TABLE) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(content_ids.len());
        for cid in content_ids {
            let Some(row) = rows
                .iter()
                .find(|r| long_at(r, CONTENT_ID_COLUMN) == Some(*cid))
            else {
                continue;
            };
            let (Some(content_type), Some(revision)) = (
                long_at(row, CONTENT_TYPE_COLUMN),
                long_at(row, CURRENT_REVISION_COLUMN).and_then(|r| i32::try_from(r).ok()),
            ) else {
                debug!(content_id = cid, "memory.summary.malformed");
                continue;
            };
            out.push(ContentSummary {
                content_id: *cid,
                content_type: ContentTypeId(content_type),
                title: row
                    .get(TITLE_COLUMN)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                object_kind: long_at(row, OBJECT_TYPE_COLUMN)
                    .and_then(ObjectKind::from_code)
                    .unwrap_or_default(),
                current_revision: revision,
                folder_id: long_at(row, FOLDER_COLUMN).map(FolderId),
            });
        }
        Ok(out)
    }

    fn create_id_set(&self, ids: &[FolderId]) -> Result<IdSetHandle> {
        let id = self.next_id_set.fetch_add(1, Ordering::AcqRel) + 1;
        self.id_sets.lock().insert(id, ids.to_vec());
        debug!(set = id, ids = ids.len(), "memory.idset.create");
        Ok(IdSetHandle(id))
    }

    fn release_id_set(&self, handle: IdSetHandle) -> Result<()> {
        match self.id_sets.lock().remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(RepoError::repository(format!(
                "temporary id set {} is not live",
                handle.0
            ))),
        }
    }

    fn evict_entity(&self, class: &str, id: Guid) {
        self.evictions.lock().push(Eviction::Entity {
            class: class.to_string(),
            id,
        });
    }

    fn evict_class(&self, class: &str) {
        self.evictions.lock().push(Eviction::Class(class.to_string()));
    }

    fn evict_collection(&self, role: &str, owner: Guid) {
        self.evictions.lock().push(Eviction::Collection {
            role: role.to_string(),
            owner,
        });
    }

    fn evict_summary(&self, content_id: i64) {
        self.evictions.lock().push(Eviction::Summary(content_id));
    }
}

/// Folder tree keyed by path.
#[derive(Debug, Default)]
pub struct InMemoryFolders {
    folders: Vec<(String, FolderId)>,
    expansions: AtomicU64,
}

impl InMemoryFolders {
    /// Creates a tree from `(path, id)` pairs.
    pub fn new<P: Into<String>>(folders: impl IntoIterator<Item = (P, FolderId)>) -> Self {
        Self {
            folders: folders.into_iter().map(|(p, id)| (p.into(), id)).collect(),
            expansions: AtomicU64::new(0),
        }
    }

    /// Number of expansions served.
    pub fn expansions(&self) -> u64 {
        self.expansions.load(Ordering::Acquire)
    }
}

impl FolderPathExpander for InMemoryFolders {
    fn expand(&self, pattern: &str) -> Result<Vec<FolderId>> {
        self.expansions.fetch_add(1, Ordering::AcqRel);
        let mut ids: Vec<FolderId> = self
            .folders
            .iter()
            .filter(|(path, _)| like_match(path, pattern))
            .map(|(_, id)| *id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Sink keeping every published event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ContentChangeEvent>>,
}

impl CollectingSink {
    /// Events published so far.
    pub fn events(&self) -> Vec<ContentChangeEvent> {
        self.events.lock().clone()
    }
}

impl ContentChangeSink for CollectingSink {
    fn publish(&self, event: &ContentChangeEvent) {
        self.events.lock().push(event.clone());
    }
}
