mod support;

use support::{fixture, fixture_with, seed_article, seed_news, ARTICLE, NEWS};
use typeforge::access::{ContentSummary, Eviction, RowRequest};
use typeforge::loader::{LazyState, Property};
use typeforge::schema::{ChildDef, ContentTypeDef, FieldDef, ObjectKind, TypeDescriptor};
use typeforge::types::{ChildId, ErrorKind};
use typeforge::{
    ContentTypeId, Guid, LoadOptions, QueryBuilder, RepoError, RepositoryConfig, Result,
    SchemaBatch, TypeKey, Value,
};

#[test]
fn eager_fields_load_and_large_fields_defer() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);

    let nodes = fx.repo.load_by_guids(&[Guid::item(5, 2)], LoadOptions::default())?;
    assert_eq!(nodes.len(), 1);
    let node = &nodes[0];
    assert_eq!(node.type_name(), "Article");
    assert_eq!(node.value("rx:title"), Some(&Value::from("Hello")));
    assert_eq!(node.value("keywords"), Some(&Value::from("cms")));
    assert!(node.is_deferred("rx:body"));
    assert!(node.is_deferred("rx:image"));
    assert_eq!(node.lazy_state(), LazyState::Pending);

    assert_eq!(node.value("rx:sys_contentid"), Some(&Value::Long(5)));
    assert_eq!(node.value("rx:sys_revision"), Some(&Value::Long(2)));
    assert_eq!(node.value("rx:sys_title"), Some(&Value::from("Hello")));
    assert_eq!(node.value("rx:sys_folderid"), Some(&Value::Long(11)));
    assert_eq!(
        node.values("rx:tags"),
        Some(&[Value::from("news"), Value::from("rust")][..])
    );
    Ok(())
}

#[test]
fn sorted_children_follow_sort_rank() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);

    let nodes = fx.repo.load_by_guids(&[Guid::item(5, 2)], LoadOptions::default())?;
    let node = &nodes[0];
    assert!(node.children_loaded());
    let authors = node.child("Author").expect("author collection");
    assert_eq!(authors.key, TypeKey::child(ARTICLE, support::AUTHOR));
    let names: Vec<&Value> = authors
        .nodes
        .iter()
        .filter_map(|n| n.value("name"))
        .collect();
    assert_eq!(
        names,
        vec![&Value::from("Ada"), &Value::from("Grace"), &Value::from("Linus")]
    );
    assert_eq!(authors.nodes[0].guid(), Guid::child_row(5, 2, 8));
    assert!(authors.nodes.iter().all(|n| n.is_deferred("bio")));
    Ok(())
}

#[test]
fn lazy_rows_are_applied_exactly_once() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    let mut nodes = fx.repo.load_by_guids(&[Guid::item(5, 2)], LoadOptions::default())?;
    let loads = fx.access.stats().row_loads;

    let text_only = LoadOptions::default();
    assert_eq!(fx.repo.load_lazy(&mut nodes, text_only)?, 4);
    assert_eq!(fx.access.stats().row_loads, loads + 2, "one item load, one child load");
    let node = &nodes[0];
    assert_eq!(node.value("body"), Some(&Value::from("<p>Hello</p>")));
    assert!(node.is_deferred("image"));
    assert_eq!(node.lazy_state(), LazyState::PartiallyLoaded);
    let authors = &node.child("Author").expect("authors").nodes;
    assert_eq!(authors[0].value("bio"), Some(&Value::from("bio of Ada")));
    assert!(authors.iter().all(|n| n.lazy_state() == LazyState::Loaded));

    assert_eq!(fx.repo.load_lazy(&mut nodes, text_only)?, 0);
    assert_eq!(fx.access.stats().row_loads, loads + 2);

    let binary = LoadOptions {
        binary_access: true,
        ..LoadOptions::default()
    };
    assert_eq!(fx.repo.load_lazy(&mut nodes, binary)?, 1);
    assert_eq!(
        nodes[0].value("image"),
        Some(&Value::Bytes(vec![0xFF, 0xD8, 5]))
    );
    assert_eq!(nodes[0].lazy_state(), LazyState::Loaded);
    assert_eq!(fx.repo.load_lazy(&mut nodes, binary)?, 0);
    assert_eq!(fx.access.stats().row_loads, loads + 3);
    Ok(())
}

#[test]
fn lazy_loads_request_binary_columns_only_with_binary_access() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    let mut nodes = fx.repo.load_by_guids(&[Guid::item(5, 2)], LoadOptions::default())?;
    let desc = fx.repo.lookup(&TypeKey::parent(ARTICLE)).expect("article");
    let lobs = class_name(&desc, true);
    let author_lobs = class_name(&desc.children()[0], true);

    let seen = fx.access.row_requests().len();
    fx.repo.load_lazy(&mut nodes, LoadOptions::default())?;
    assert_eq!(
        fx.access.row_requests()[seen..],
        [
            RowRequest {
                class: lobs.clone(),
                fields: Some(vec!["body".to_string()]),
            },
            RowRequest {
                class: author_lobs,
                fields: Some(vec!["bio".to_string()]),
            },
        ]
    );
    assert!(nodes[0].is_deferred("image"));

    let seen = fx.access.row_requests().len();
    let binary = LoadOptions {
        binary_access: true,
        ..LoadOptions::default()
    };
    fx.repo.load_lazy(&mut nodes, binary)?;
    assert_eq!(
        fx.access.row_requests()[seen..],
        [RowRequest {
            class: lobs,
            fields: None,
        }]
    );
    Ok(())
}

#[test]
fn dead_children_are_skipped_without_failing_the_parent() -> Result<()> {
    let fx = fixture();
    let mut batch = SchemaBatch::new();
    batch.register(support::news().child(ChildDef::new(ChildId(4), "Empty", "CT_NEWS_EMPTY")));
    fx.repo.register_batch(&batch)?;
    let desc = fx.repo.lookup(&TypeKey::parent(NEWS)).expect("news");
    assert!(desc.children().iter().any(|c| c.is_dead()));
    seed_news(&fx.access, 7, "Quiet", 2, 20);

    let mut nodes = fx.repo.load_by_guids(&[Guid::item(7, 1)], LoadOptions::default())?;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].value("title"), Some(&Value::from("Quiet")));
    assert!(nodes[0].children_loaded());
    assert!(nodes[0].child("Empty").is_none());
    assert_eq!(fx.repo.load_lazy(&mut nodes, LoadOptions::default())?, 0);
    Ok(())
}

#[test]
fn minimal_loads_omit_lazy_fields_and_children() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    let options = LoadOptions {
        children: false,
        minimal: true,
        binary_access: false,
    };
    let nodes = fx.repo.load_by_guids(&[Guid::item(5, 2)], options)?;
    let node = &nodes[0];
    assert!(node.property("body").is_none());
    assert!(!node
        .properties()
        .any(|(_, p)| matches!(p, Property::Deferred)));
    assert_eq!(node.lazy_state(), LazyState::None);
    assert!(!node.children_loaded());
    assert!(node.children().is_empty());
    Ok(())
}

#[test]
fn results_keep_request_order_and_skip_unknown_identities() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    seed_news(&fx.access, 40, "Breaking", 1, 20);

    let request = [
        Guid::item(40, 1),
        Guid::item(99, 1),
        Guid::item(5, 2),
        Guid::item(5, 7),
        Guid::child_row(5, 2, 8),
    ];
    let nodes = fx.repo.load_by_guids(&request, LoadOptions::default())?;
    let loaded: Vec<Guid> = nodes.iter().map(|n| n.guid()).collect();
    assert_eq!(loaded, vec![Guid::item(40, 1), Guid::item(5, 2)]);
    assert_eq!(nodes[0].value("priority"), Some(&Value::Long(1)));
    assert_eq!(fx.repo.loader().cached_summaries(), 2);

    let json = serde_json::to_value(&nodes[0]).expect("serialize node");
    assert_eq!(json["type_name"], "News");
    Ok(())
}

#[test]
fn zero_capacity_disables_summary_cache() -> Result<()> {
    let config = RepositoryConfig::from_toml_str("[loader]\nsummary_cache_capacity = 0\n")?;
    let fx = fixture_with(config);
    seed_news(&fx.access, 40, "Breaking", 1, 20);
    let nodes = fx.repo.load_by_guids(&[Guid::item(40, 1)], LoadOptions::default())?;
    assert_eq!(nodes.len(), 1);
    assert_eq!(fx.repo.loader().cached_summaries(), 0);
    Ok(())
}

fn class_name(desc: &TypeDescriptor, lazy: bool) -> String {
    desc.row_classes()
        .iter()
        .find(|c| c.lazy == lazy)
        .and_then(|c| c.class())
        .map(|c| c.name.clone())
        .expect("synthesized class")
}

#[test]
fn evict_clears_every_cached_region() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    let guid = Guid::item(5, 2);
    fx.repo.load_by_guids(&[guid], LoadOptions::default())?;
    assert_eq!(fx.repo.loader().cached_summaries(), 1);

    fx.repo.evict(&[guid])?;
    assert_eq!(fx.repo.loader().cached_summaries(), 0);

    let desc = fx.repo.lookup(&TypeKey::parent(ARTICLE)).expect("article");
    let main = class_name(&desc, false);
    let lobs = class_name(&desc, true);
    let author = &desc.children()[0];

    let evictions = fx.access.evictions();
    let expected = [
        Eviction::Summary(5),
        Eviction::Entity {
            class: main.clone(),
            id: guid,
        },
        Eviction::Entity {
            class: lobs,
            id: guid,
        },
        Eviction::Collection {
            role: format!("{main}.tags"),
            owner: guid,
        },
        Eviction::Collection {
            role: format!("{main}.Author"),
            owner: guid,
        },
        Eviction::Class(class_name(author, false)),
        Eviction::Class(class_name(author, true)),
    ];
    assert_eq!(evictions, expected);
    let events = fx.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].items, vec![guid]);
    Ok(())
}

#[test]
fn dead_types_error_when_named() -> Result<()> {
    let fx = fixture();
    let ghost = ContentTypeId(400);
    let mut batch = SchemaBatch::new();
    batch.register(
        ContentTypeDef::new(ghost, "Ghost")
            .field(FieldDef::new("keywords", "text", "RXS_META", "KEYWORDS").shared()),
    );
    fx.repo.register_batch(&batch)?;
    let desc = fx.repo.lookup(&TypeKey::parent(ghost)).expect("ghost registered");
    assert!(desc.is_dead());

    fx.access.insert_summary(&ContentSummary {
        content_id: 77,
        content_type: ghost,
        title: "boo".into(),
        object_kind: ObjectKind::Item,
        current_revision: 1,
        folder_id: None,
    });
    let err = fx
        .repo
        .load_by_guids(&[Guid::item(77, 1)], LoadOptions::default())
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownContentType(id) if id == ghost));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let named = QueryBuilder::of_type("Ghost").build();
    assert!(matches!(
        fx.repo.execute(&named),
        Err(RepoError::UnknownContentType(_))
    ));
    let wildcard = fx.repo.execute(&QueryBuilder::any().build())?;
    assert!(wildcard.plans.iter().all(|p| p.content_type != ghost));
    Ok(())
}
