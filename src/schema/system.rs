//! Static registry of system (summary) fields and the fixed identity columns.

use serde::{Deserialize, Serialize};

use super::PropertyType;

/// Table holding one summary row per content item.
pub const SUMMARY_TABLE: &str = "CONTENTSTATUS";
/// Content id column present in every content table.
pub const CONTENT_ID_COLUMN: &str = "CONTENTID";
/// Revision column present in every content table.
pub const REVISION_COLUMN: &str = "REVISIONID";
/// Surrogate row id column of child tables.
pub const SYS_ID_COLUMN: &str = "SYSID";
/// Sort rank column of sorted child tables.
pub const SORT_RANK_COLUMN: &str = "SORTRANK";
/// Summary column holding the revision queries target.
pub const CURRENT_REVISION_COLUMN: &str = "CURRENTREVISION";
/// Internal name of the folder id system field; surfaced as `rx:sys_folderid`.
pub const FOLDER_ID_FIELD: &str = "sys_folderid";

/// Where a system field's column lives.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemSource {
    /// Column of the content type's own primary table.
    Row,
    /// Column of the summary table.
    Summary,
}

/// One system field.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SystemField {
    /// Field name without the `rx:` prefix.
    pub name: String,
    /// Backing column.
    pub column: String,
    /// Semantic type.
    pub ty: PropertyType,
    /// Table the column belongs to.
    pub source: SystemSource,
}

impl SystemField {
    fn new(name: &str, column: &str, ty: PropertyType, source: SystemSource) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            ty,
            source,
        }
    }
}

/// Ordered set of system fields available on every item type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SystemFields {
    fields: Vec<SystemField>,
}

impl Default for SystemFields {
    fn default() -> Self {
        Self::standard()
    }
}

impl SystemFields {
    /// The standard summary layout.
    pub fn standard() -> Self {
        Self {
            fields: vec![
                SystemField::new(
                    "sys_contentid",
                    CONTENT_ID_COLUMN,
                    PropertyType::Long,
                    SystemSource::Row,
                ),
                SystemField::new(
                    "sys_revision",
                    REVISION_COLUMN,
                    PropertyType::Long,
                    SystemSource::Row,
                ),
                SystemField::new(
                    "sys_contenttypeid",
                    "CONTENTTYPEID",
                    PropertyType::Long,
                    SystemSource::Summary,
                ),
                SystemField::new("sys_title", "TITLE", PropertyType::String, SystemSource::Summary),
                SystemField::new(
                    "sys_objecttype",
                    "OBJECTTYPE",
                    PropertyType::Long,
                    SystemSource::Summary,
                ),
                SystemField::new(
                    FOLDER_ID_FIELD,
                    "FOLDERID",
                    PropertyType::Long,
                    SystemSource::Summary,
                ),
            ],
        }
    }

    /// Builds a registry from configured fields.
    pub fn from_fields(fields: Vec<SystemField>) -> Self {
        Self { fields }
    }

    /// Looks up a system field by name (without prefix).
    pub fn get(&self, name: &str) -> Option<&SystemField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates the fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SystemField> {
        self.fields.iter()
    }

    /// Column of the summary table holding `name`, if it is a summary field.
    pub fn summary_column(&self, name: &str) -> Option<&str> {
        self.get(name)
            .filter(|f| f.source == SystemSource::Summary)
            .map(|f| f.column.as_str())
    }
}
