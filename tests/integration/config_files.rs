use std::fs;
use std::sync::Arc;

use typeforge::access::{InMemoryAccess, InMemoryFolders, NullChangeSink};
use typeforge::schema::{FileDefinitions, PropertyType, SystemSource};
use typeforge::{
    BatchOutcome, ConfigError, ContentRepository, ContentTypeId, RepositoryConfig, Result,
    TypeKey,
};

const CONFIG: &str = r#"
[dialect]
lob_streaming = false

[query]
max_inline_ids = 8

[loader]
summary_cache_capacity = 16

[logging]
filter = "typeforge=debug"

[[system_fields]]
name = "sys_contentid"
column = "CONTENTID"
ty = "long"
source = "row"

[[system_fields]]
name = "sys_title"
column = "TITLE"
ty = "string"
source = "summary"
"#;

const DEFINITIONS: &str = r#"
[[types]]
id = 900
name = "Press Release"

[[types.fields]]
submit_name = "headline"
data_type = "text"
locator = { table = "CT_PRESS", column = "HEADLINE" }

[[types.fields]]
submit_name = "body"
data_type = "text"
format = "max"
locator = { table = "CT_PRESS", column = "BODY" }

[[types.children]]
child_id = 1
name = "regions"
table = "CT_PRESS_REGION"
simple = true

[[types.children.fields]]
submit_name = "region"
data_type = "text"
locator = { table = "CT_PRESS_REGION", column = "REGION" }
"#;

#[test]
fn loads_config_file_with_custom_system_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("typeforge.toml");
    fs::write(&path, CONFIG)?;

    let config = RepositoryConfig::load(&path)?;
    assert!(!config.dialect().lob_streaming);
    assert_eq!(config.query_options().max_inline_ids, 8);
    assert_eq!(config.query_options().max_predicate_depth, 64);
    assert_eq!(config.loader.summary_cache_capacity, 16);
    assert_eq!(config.logging.filter, "typeforge=debug");

    let system = config.system_fields();
    assert_eq!(system.iter().count(), 2);
    let title = system.get("sys_title").expect("title field");
    assert_eq!(title.ty, PropertyType::String);
    assert_eq!(title.source, SystemSource::Summary);
    assert_eq!(system.summary_column("sys_title"), Some("TITLE"));
    Ok(())
}

#[test]
fn missing_and_malformed_files_report_their_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("absent.toml");
    match RepositoryConfig::load(&missing) {
        Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected read error, got {other:?}"),
    }

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[loader\nsummary_cache_capacity = ")?;
    let err = RepositoryConfig::load(&broken).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { path: Some(ref p), .. } if *p == broken));
    assert!(err.to_string().contains("broken.toml"));
    Ok(())
}

#[test]
fn definitions_file_registers_types() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("typeforge.toml");
    let defs_path = dir.path().join("types.toml");
    fs::write(&config_path, CONFIG)?;
    fs::write(&defs_path, DEFINITIONS)?;

    let config = RepositoryConfig::load(&config_path)?;
    let access = Arc::new(InMemoryAccess::new());
    let repo = ContentRepository::new(
        &config,
        access.clone(),
        Arc::new(InMemoryFolders::default()),
        Arc::new(NullChangeSink),
    );
    let source = FileDefinitions::load(&defs_path)?;
    assert_eq!(repo.initialize(&source)?, BatchOutcome::Rebuilt(1));

    let desc = repo
        .lookup(&TypeKey::parent(ContentTypeId(900)))
        .expect("press release registered");
    assert_eq!(desc.type_name(), "Press Release");
    assert!(desc.is_multi_valued("regions"));
    assert!(desc.lazy_properties().contains("body"));

    let main = desc.main_class().and_then(|c| c.class()).expect("main class");
    assert_eq!(main.name, "Press_Release");
    assert!(access.installed_class(&main.name).is_some());
    let lobs = desc.lazy_class().and_then(|c| c.class()).expect("lobs class");
    assert_eq!(lobs.fields[0].form, typeforge::synth::ColumnForm::Inline);
    Ok(())
}
