//! Content type definitions and the descriptors derived from them.

pub mod definition;
pub mod descriptor;
pub mod system;

pub use definition::{
    ChildDef, ColumnLocator, ContentTypeDef, DefinitionSource, FieldDef, FieldSource,
    FileDefinitions, ObjectKind, StaticDefinitions,
};
pub use descriptor::{
    FieldMapping, LoadPolicy, PropertyType, RowClassDescriptor, SimpleChild, TypeDescriptor,
};
pub use system::{
    SystemField, SystemFields, SystemSource, CONTENT_ID_COLUMN, CURRENT_REVISION_COLUMN,
    FOLDER_ID_FIELD, REVISION_COLUMN, SORT_RANK_COLUMN, SUMMARY_TABLE, SYS_ID_COLUMN,
};
