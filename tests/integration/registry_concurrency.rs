mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use support::{article, fixture, seed_article, seed_news, ARTICLE, AUTHOR, NEWS};
use typeforge::schema::{FieldDef, ObjectKind};
use typeforge::{Guid, LoadOptions, QueryBuilder, Result, SchemaBatch, TypeKey};

const READERS: usize = 6;
const ROUNDS: usize = 40;

#[test]
fn writer_waits_for_open_view() -> Result<()> {
    let fx = fixture();
    let registry = Arc::clone(fx.repo.registry());
    let view = registry.view();
    let snapshot = registry.lock_snapshot();
    assert!(snapshot.readers >= 1);
    assert!(!snapshot.writer);

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let registry = Arc::clone(&registry);
        let done = Arc::clone(&done);
        thread::spawn(move || -> Result<()> {
            let mut batch = SchemaBatch::new();
            batch.unregister(NEWS).register(support::news());
            registry.register_batch(&batch)?;
            done.store(true, Ordering::SeqCst);
            Ok(())
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst), "writer ran while a view was open");
    assert!(view.parent(NEWS).is_some());
    drop(view);

    writer.join().expect("writer thread")?;
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(registry.lock_snapshot().readers, 0);
    Ok(())
}

#[test]
fn readers_observe_whole_batches() -> Result<()> {
    let fx = fixture();
    for cid in 0..20 {
        seed_news(&fx.access, 100 + cid, &format!("n{cid}"), cid, 10);
    }
    let repo = Arc::new(fx.repo);
    let barrier = Arc::new(Barrier::new(READERS + 1));
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for _ in 0..READERS {
        let repo = Arc::clone(&repo);
        let barrier = Arc::clone(&barrier);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || -> Result<usize> {
            barrier.wait();
            let query = QueryBuilder::of_type("News").select("rx:title").build();
            let mut reads = 0;
            while !stop.load(Ordering::Acquire) {
                let result = repo.execute(&query)?;
                assert_eq!(result.rows.len(), 20);
                if let Some(desc) = repo.lookup(&TypeKey::parent(NEWS)) {
                    // Both fields appear together or not at all.
                    assert_eq!(desc.field("lead").is_some(), desc.field("byline").is_some());
                }
                reads += 1;
            }
            Ok(reads)
        }));
    }

    barrier.wait();
    for round in 0..ROUNDS {
        let def = if round % 2 == 0 {
            support::news()
                .field(FieldDef::new("lead", "text", "CT_NEWS", "LEAD"))
                .field(FieldDef::new("byline", "text", "CT_NEWS", "BYLINE"))
        } else {
            support::news()
        };
        let mut batch = SchemaBatch::new();
        batch.unregister(NEWS).register(def);
        repo.register_batch(&batch)?;
    }
    stop.store(true, Ordering::Release);

    let mut total = 0;
    for handle in handles {
        total += handle.join().expect("reader thread")?;
    }
    assert!(total > 0);
    let stats = repo.registry().stats();
    assert_eq!(stats.rebuilds, 1 + ROUNDS as u64);
    assert!(repo.lookup(&TypeKey::parent(NEWS)).is_some());
    Ok(())
}

#[test]
fn readers_never_see_children_of_removed_parents() -> Result<()> {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    let repo = Arc::new(fx.repo);
    let barrier = Arc::new(Barrier::new(READERS + 1));
    let stop = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::new();
    for _ in 0..READERS {
        let repo = Arc::clone(&repo);
        let barrier = Arc::clone(&barrier);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || -> Result<usize> {
            barrier.wait();
            let mut reads = 0;
            while !stop.load(Ordering::Acquire) {
                {
                    let view = repo.registry().view();
                    for parent in view.parents(ObjectKind::Item) {
                        for child in parent.children() {
                            let linked = view.lookup(&child.key()).expect("linked child registered");
                            assert!(Arc::ptr_eq(linked, child));
                            assert!(view.lookup(&child.key().parent_key()).is_some());
                        }
                    }
                    if view.lookup(&TypeKey::child(ARTICLE, AUTHOR)).is_some() {
                        assert!(view.parent(ARTICLE).is_some(), "child without parent");
                    }
                }
                let nodes = repo.load_by_guids(&[Guid::item(5, 2)], LoadOptions::default())?;
                if let Some(node) = nodes.first() {
                    let authors = node.child("Author").expect("author collection");
                    assert_eq!(authors.nodes.len(), 3);
                }
                reads += 1;
            }
            Ok(reads)
        }));
    }

    barrier.wait();
    for round in 0..ROUNDS {
        let mut batch = SchemaBatch::new();
        match round % 4 {
            0 | 2 => {
                batch.unregister(ARTICLE);
            }
            1 => {
                batch.register(article().field(FieldDef::new(
                    "subtitle",
                    "text",
                    "CT_ARTICLE",
                    "SUBTITLE",
                )));
            }
            _ => {
                batch.register(article());
            }
        }
        repo.register_batch(&batch)?;
    }
    stop.store(true, Ordering::Release);

    let mut total = 0;
    for handle in handles {
        total += handle.join().expect("reader thread")?;
    }
    assert!(total > 0);
    assert!(repo.lookup(&TypeKey::parent(ARTICLE)).is_some());
    assert!(repo.lookup(&TypeKey::child(ARTICLE, AUTHOR)).is_some());
    Ok(())
}
