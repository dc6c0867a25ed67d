mod support;

use std::sync::Arc;

use support::{article, fixture, seed_article, ARTICLE, AUTHOR, NEWS};
use typeforge::access::Eviction;
use typeforge::schema::FieldDef;
use typeforge::types::ErrorKind;
use typeforge::{BatchOutcome, Guid, Result, SchemaBatch, TypeKey};

#[test]
fn unregister_then_identical_register_restores_original_graph() -> Result<()> {
    let fx = support::fixture();
    let registry = fx.repo.registry();
    let parent = registry.lookup(&TypeKey::parent(ARTICLE)).expect("article registered");
    let child = registry
        .lookup(&TypeKey::child(ARTICLE, AUTHOR))
        .expect("author registered");
    let issued = registry.synthesizer().naming().issued();
    let installs = fx.access.stats().installs;

    let mut removal = SchemaBatch::new();
    removal.unregister(ARTICLE);
    assert_eq!(registry.register_batch(&removal)?, BatchOutcome::Removed(2));
    assert!(registry.lookup(&TypeKey::parent(ARTICLE)).is_none());
    assert_eq!(registry.stats().remembered, 2);

    let mut again = SchemaBatch::new();
    again.register(article());
    assert_eq!(registry.register_batch(&again)?, BatchOutcome::Restored(2));

    let restored = registry.lookup(&TypeKey::parent(ARTICLE)).expect("restored");
    assert!(Arc::ptr_eq(&parent, &restored));
    assert!(Arc::ptr_eq(
        &child,
        &registry.lookup(&TypeKey::child(ARTICLE, AUTHOR)).expect("child restored")
    ));
    assert!(Arc::ptr_eq(&restored.children()[0], &child));
    assert_eq!(registry.synthesizer().naming().issued(), issued, "no class synthesized");
    assert_eq!(fx.access.stats().installs, installs, "no mapping installed");
    assert_eq!(registry.stats().restores, 1);
    assert_eq!(registry.stats().remembered, 0);
    Ok(())
}

#[test]
fn replace_in_one_batch_restores() -> Result<()> {
    let fx = fixture();
    let registry = fx.repo.registry();
    let before = registry.lookup(&TypeKey::parent(ARTICLE)).expect("article");
    let rebuilds = registry.stats().rebuilds;

    let mut batch = SchemaBatch::new();
    batch.unregister(ARTICLE).register(article());
    assert_eq!(registry.register_batch(&batch)?, BatchOutcome::Restored(2));
    let after = registry.lookup(&TypeKey::parent(ARTICLE)).expect("article");
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(registry.stats().rebuilds, rebuilds);
    Ok(())
}

#[test]
fn changed_definition_rebuilds_and_forgets_removals() -> Result<()> {
    let fx = fixture();
    let registry = fx.repo.registry();
    let before = registry.lookup(&TypeKey::parent(ARTICLE)).expect("article");

    let mut removal = SchemaBatch::new();
    removal.unregister(ARTICLE);
    registry.register_batch(&removal)?;

    let changed = article().field(FieldDef::new("subtitle", "text", "CT_ARTICLE", "SUBTITLE"));
    let mut batch = SchemaBatch::new();
    batch.register(changed);
    assert!(matches!(registry.register_batch(&batch)?, BatchOutcome::Rebuilt(_)));

    let after = registry.lookup(&TypeKey::parent(ARTICLE)).expect("article");
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.field("subtitle").is_some());
    let stats = registry.stats();
    assert_eq!(stats.rebuilds, 2);
    assert_eq!(stats.remembered, 0);
    assert!(registry.lookup(&TypeKey::parent(NEWS)).is_some());
    Ok(())
}

#[test]
fn failed_install_keeps_previous_state() -> Result<()> {
    let fx = fixture();
    let registry = fx.repo.registry();
    let before = registry.lookup(&TypeKey::parent(NEWS)).expect("news");
    let epoch = registry.stats().epoch;

    fx.access.fail_next_install("provider offline");
    let mut batch = SchemaBatch::new();
    batch.register(support::news().field(FieldDef::new("lead", "text", "CT_NEWS", "LEAD")));
    let err = registry.register_batch(&batch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);

    let after = registry.lookup(&TypeKey::parent(NEWS)).expect("news still registered");
    assert!(Arc::ptr_eq(&before, &after));
    assert!(after.field("lead").is_none());
    assert_eq!(registry.stats().epoch, epoch);
    Ok(())
}

#[test]
fn evicting_items_of_an_unregistered_type_is_safe() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 10);

    let mut removal = SchemaBatch::new();
    removal.unregister(ARTICLE);
    fx.repo.register_batch(&removal)?;

    let guid = Guid::item(5, 2);
    fx.repo.evict(&[guid])?;

    let evictions = fx.access.evictions();
    assert_eq!(evictions, vec![Eviction::Summary(5)]);
    let events = fx.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].items, vec![guid]);
    Ok(())
}

#[test]
fn rebuilds_release_names_of_replaced_classes() -> Result<()> {
    let fx = fixture();
    let registry = fx.repo.registry();
    let naming = registry.synthesizer().naming();
    assert_eq!(naming.issued(), fx.access.stats().installed_classes);

    for round in 0..5 {
        let mut batch = SchemaBatch::new();
        batch.register(support::news().field(FieldDef::new(
            format!("extra{round}"),
            "text",
            "CT_NEWS",
            format!("EXTRA{round}"),
        )));
        assert!(matches!(registry.register_batch(&batch)?, BatchOutcome::Rebuilt(_)));
        assert_eq!(naming.issued(), fx.access.stats().installed_classes);
    }

    fx.access.fail_next_install("provider offline");
    let mut batch = SchemaBatch::new();
    batch.register(support::news());
    assert!(registry.register_batch(&batch).is_err());
    assert_eq!(naming.issued(), fx.access.stats().installed_classes);
    Ok(())
}
