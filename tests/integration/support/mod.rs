#![allow(dead_code)]

use std::sync::Arc;

use typeforge::access::{CollectingSink, InMemoryAccess, InMemoryFolders};
use typeforge::access::ContentSummary;
use typeforge::schema::{ChildDef, ContentTypeDef, FieldDef, ObjectKind, StaticDefinitions};
use typeforge::types::{ChildId, FolderId};
use typeforge::{ContentRepository, ContentTypeId, RepositoryConfig, Value};

pub const ARTICLE: ContentTypeId = ContentTypeId(311);
pub const NEWS: ContentTypeId = ContentTypeId(312);
pub const TEMPLATE: ContentTypeId = ContentTypeId(313);
pub const AUTHOR: ChildId = ChildId(2);

pub fn article() -> ContentTypeDef {
    ContentTypeDef::new(ARTICLE, "Article")
        .field(FieldDef::new("title", "text", "CT_ARTICLE", "TITLE"))
        .field(FieldDef::new("body", "text", "CT_ARTICLE", "BODY").format("max"))
        .field(FieldDef::new("image", "binary", "CT_ARTICLE", "IMAGE"))
        .field(FieldDef::new("keywords", "text", "RXS_META", "KEYWORDS").shared())
        .child(
            ChildDef::new(ChildId(1), "tags", "CT_ARTICLE_TAGS")
                .simple()
                .field(FieldDef::new("tag", "text", "CT_ARTICLE_TAGS", "TAG")),
        )
        .child(
            ChildDef::new(AUTHOR, "Author", "CT_ARTICLE_AUTHOR")
                .sorted()
                .field(FieldDef::new("name", "text", "CT_ARTICLE_AUTHOR", "NAME"))
                .field(FieldDef::new("bio", "text", "CT_ARTICLE_AUTHOR", "BIO").format("max")),
        )
}

pub fn news() -> ContentTypeDef {
    ContentTypeDef::new(NEWS, "News")
        .field(FieldDef::new("title", "text", "CT_NEWS", "TITLE"))
        .field(FieldDef::new("priority", "integer", "CT_NEWS", "PRIORITY"))
}

pub fn template() -> ContentTypeDef {
    ContentTypeDef::new(TEMPLATE, "Template")
        .kind(ObjectKind::Folder)
        .field(FieldDef::new("title", "text", "CT_TEMPLATE", "TITLE"))
}

pub fn definitions() -> StaticDefinitions {
    StaticDefinitions::new([article(), news(), template()])
}

pub struct Fixture {
    pub access: Arc<InMemoryAccess>,
    pub folders: Arc<InMemoryFolders>,
    pub sink: Arc<CollectingSink>,
    pub repo: ContentRepository,
}

pub fn folders() -> InMemoryFolders {
    InMemoryFolders::new([
        ("//Sites/a", FolderId(10)),
        ("//Sites/a/news", FolderId(11)),
        ("//Sites/b", FolderId(20)),
    ])
}

pub fn fixture_with(config: RepositoryConfig) -> Fixture {
    let access = Arc::new(InMemoryAccess::new());
    let folders = Arc::new(folders());
    let sink = Arc::new(CollectingSink::default());
    let repo = ContentRepository::new(&config, access.clone(), folders.clone(), sink.clone());
    repo.initialize(&definitions()).expect("register fixture types");
    Fixture {
        access,
        folders,
        sink,
        repo,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(RepositoryConfig::default())
}

fn summary(access: &InMemoryAccess, cid: i64, ty: ContentTypeId, title: &str, rev: i32, folder: i64) {
    access.insert_summary(&ContentSummary {
        content_id: cid,
        content_type: ty,
        title: title.to_string(),
        object_kind: ObjectKind::Item,
        current_revision: rev,
        folder_id: Some(FolderId(folder)),
    });
}

pub fn seed_article(access: &InMemoryAccess, cid: i64, rev: i32, title: &str, folder: i64) {
    summary(access, cid, ARTICLE, title, rev, folder);
    access.insert_row(
        "CT_ARTICLE",
        [
            ("CONTENTID", Value::Long(cid)),
            ("REVISIONID", Value::from(rev)),
            ("TITLE", Value::from(title)),
            ("BODY", Value::from(format!("<p>{title}</p>"))),
            ("IMAGE", Value::Bytes(vec![0xFF, 0xD8, cid as u8])),
        ],
    );
    access.insert_row(
        "RXS_META",
        [
            ("CONTENTID", Value::Long(cid)),
            ("REVISIONID", Value::from(rev)),
            ("KEYWORDS", Value::from("cms")),
        ],
    );
    for (sys, tag) in [(2_i64, "rust"), (1, "news")] {
        access.insert_row(
            "CT_ARTICLE_TAGS",
            [
                ("CONTENTID", Value::Long(cid)),
                ("REVISIONID", Value::from(rev)),
                ("SYSID", Value::Long(sys)),
                ("TAG", Value::from(tag)),
            ],
        );
    }
    for (sys, rank, name) in [(7_i64, 2_i64, "Grace"), (8, 1, "Ada"), (9, 3, "Linus")] {
        access.insert_row(
            "CT_ARTICLE_AUTHOR",
            [
                ("CONTENTID", Value::Long(cid)),
                ("REVISIONID", Value::from(rev)),
                ("SYSID", Value::Long(sys)),
                ("SORTRANK", Value::Long(rank)),
                ("NAME", Value::from(name)),
                ("BIO", Value::from(format!("bio of {name}"))),
            ],
        );
    }
}

pub fn seed_news(access: &InMemoryAccess, cid: i64, title: &str, priority: i64, folder: i64) {
    summary(access, cid, NEWS, title, 1, folder);
    access.insert_row(
        "CT_NEWS",
        [
            ("CONTENTID", Value::Long(cid)),
            ("REVISIONID", Value::Long(1)),
            ("TITLE", Value::from(title)),
            ("PRIORITY", Value::Long(priority)),
        ],
    );
}
