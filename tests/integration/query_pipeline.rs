mod support;

use support::{fixture, fixture_with, seed_article, seed_news, ARTICLE, NEWS};
use typeforge::query::{CompareOp, Expr, QueryError, SortDirection};
use typeforge::types::ErrorKind;
use typeforge::{QueryBuilder, RepoError, RepositoryConfig, Result, Value};

fn seeded() -> support::Fixture {
    let fx = fixture();
    seed_article(&fx.access, 5, 2, "Hello", 11);
    seed_article(&fx.access, 6, 1, "World", 20);
    for (cid, title, priority) in [(40, "d", 4), (41, "a", 1), (42, "c", 3), (43, "b", 2)] {
        seed_news(&fx.access, cid, title, priority, 20);
    }
    fx
}

#[test]
fn path_query_expands_once_and_plans_every_type() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::any().under_path("//Sites/a/%").build();
    let result = fx.repo.execute(&query)?;

    assert_eq!(fx.folders.expansions(), 1);
    assert_eq!(result.plans.len(), 2);
    assert_eq!(result.plans[0].content_type, ARTICLE);
    assert_eq!(result.plans[1].content_type, NEWS);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].content_type, ARTICLE);
    assert_eq!(
        result.column("sys_contentid"),
        vec![&Value::Long(5)]
    );
    assert_eq!(result.column("rx:sys_folderid"), vec![&Value::Long(11)]);
    assert!(result.column_index("sys_folderid").is_none());
    Ok(())
}

#[test]
fn unmatched_path_runs_degenerate_statements() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::any()
        .under_path("//Nowhere/%")
        .select("rx:title")
        .select("rx:priority")
        .build();
    let result = fx.repo.execute(&query)?;

    assert!(result.rows.is_empty());
    assert_eq!(result.plans.len(), 2);
    for plan in &result.plans {
        assert!(plan.degenerate);
        assert!(plan.sql.contains("WHERE 1 <> 1"), "{}", plan.sql);
        assert!(!plan.sql.contains("JOIN"), "{}", plan.sql);
    }
    assert_eq!(fx.access.stats().queries, 2);
    assert_eq!(result.columns, vec!["rx:title", "rx:priority"]);
    Ok(())
}

#[test]
fn max_results_truncates_in_type_then_row_order() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::of_type("Article")
        .or_type("News")
        .select("rx:title")
        .order_by("rx:title", SortDirection::Asc)
        .max_results(3)
        .build();
    let result = fx.repo.execute(&query)?;

    let titles: Vec<&Value> = result.column("rx:title");
    assert_eq!(
        titles,
        vec![&Value::from("Hello"), &Value::from("World"), &Value::from("a")]
    );
    assert!(result.plans.iter().all(|p| p.sql.ends_with("LIMIT 3")));
    Ok(())
}

#[test]
fn zero_max_results_means_unlimited() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::any().select("rx:title").max_results(0).build();
    assert_eq!(fx.repo.execute(&query)?.rows.len(), 6);
    Ok(())
}

#[test]
fn unknown_property_matches_nothing_even_negated() -> Result<()> {
    let fx = seeded();
    let positive = QueryBuilder::any()
        .where_cmp("rx:priority", CompareOp::Gt, 2_i64)
        .select("rx:title")
        .build();
    let result = fx.repo.execute(&positive)?;
    assert_eq!(result.rows.len(), 2);
    assert!(result.rows.iter().all(|r| r.content_type == NEWS));
    assert!(result.plans[0].degenerate);

    let negated = QueryBuilder::any()
        .filter(Expr::Not(Box::new(Expr::compare(
            "rx:priority",
            CompareOp::Gt,
            2_i64,
        ))))
        .select("rx:title")
        .build();
    let result = fx.repo.execute(&negated)?;
    assert_eq!(result.rows.len(), 2);
    assert!(result.rows.iter().all(|r| r.content_type == NEWS));
    Ok(())
}

#[test]
fn multi_valued_properties_are_not_queryable() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::of_type("Article")
        .where_cmp("rx:tags", CompareOp::Eq, "rust")
        .build();
    let result = fx.repo.execute(&query)?;
    assert!(result.rows.is_empty());
    assert!(result.plans[0].degenerate);
    Ok(())
}

#[test]
fn bound_parameters_and_lazy_fields_in_filters() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::of_type("Article")
        .filter(Expr::compare_param("rx:body", CompareOp::Like, "$pattern"))
        .bind("pattern", "%World%")
        .select("rx:title")
        .build();
    let result = fx.repo.execute(&query)?;
    assert_eq!(result.column("rx:title"), vec![&Value::from("World")]);

    let unbound = QueryBuilder::of_type("Article")
        .filter(Expr::compare_param("rx:title", CompareOp::Eq, "missing"))
        .build();
    let err = fx.repo.execute(&unbound).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    Ok(())
}

#[test]
fn literals_are_coerced_to_property_types() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::of_type("News")
        .where_cmp("rx:priority", CompareOp::Ge, "3")
        .select("rx:title")
        .order_by("rx:priority", SortDirection::Desc)
        .build();
    let result = fx.repo.execute(&query)?;
    assert_eq!(
        result.column("rx:title"),
        vec![&Value::from("d"), &Value::from("c")]
    );

    let bad = QueryBuilder::of_type("News")
        .where_cmp("rx:priority", CompareOp::Eq, "high")
        .build();
    assert!(matches!(
        fx.repo.execute(&bad),
        Err(RepoError::InvalidQuery(_))
    ));
    Ok(())
}

#[test]
fn binary_properties_cannot_be_sorted() {
    let fx = seeded();
    let query = QueryBuilder::of_type("Article")
        .order_by("rx:image", SortDirection::Asc)
        .build();
    let err = fx.repo.execute(&query).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
}

#[test]
fn long_folder_lists_use_a_released_temp_set() -> Result<()> {
    let config = RepositoryConfig::from_toml_str("[query]\nmax_inline_ids = 1\n")?;
    let fx = fixture_with(config);
    seed_article(&fx.access, 5, 2, "Hello", 11);
    seed_news(&fx.access, 40, "n", 1, 20);

    let query = QueryBuilder::any().under_path("//Sites/%").select("rx:title").build();
    let result = fx.repo.execute(&query)?;
    assert_eq!(result.rows.len(), 2);
    assert!(result.plans[0].sql.contains("TEMP_IDS"), "{}", result.plans[0].sql);

    let stats = fx.access.stats();
    assert_eq!(stats.id_sets_created, 1);
    assert_eq!(stats.live_id_sets, 0);

    fx.access.set_fail_queries(true);
    assert!(fx.repo.execute(&query).is_err());
    let stats = fx.access.stats();
    assert_eq!(stats.id_sets_created, 2);
    assert_eq!(stats.live_id_sets, 0, "id set released on the error path");
    Ok(())
}

#[test]
fn wildcard_skips_folder_types_and_unknown_names() -> Result<()> {
    let fx = seeded();
    let wildcard = fx.repo.execute(&QueryBuilder::any().build())?;
    assert_eq!(wildcard.plans.len(), 2);

    let named = QueryBuilder::of_type("Nope").or_type("News").build();
    let result = fx.repo.execute(&named)?;
    assert_eq!(result.plans.len(), 1);
    assert_eq!(result.rows.len(), 4);
    Ok(())
}

#[test]
fn default_projection_unions_single_valued_fields() -> Result<()> {
    let fx = seeded();
    let result = fx.repo.execute(&QueryBuilder::any().build())?;
    assert_eq!(
        result.columns,
        vec![
            "sys_contentid",
            "sys_revision",
            "sys_contenttypeid",
            "sys_title",
            "sys_objecttype",
            "rx:sys_folderid",
            "rx:body",
            "rx:keywords",
            "rx:priority",
            "rx:title",
        ]
    );
    let article = &result.rows[0];
    let keywords = result.column_index("rx:keywords").expect("keywords column");
    assert_eq!(article.values[keywords], Value::from("cms"));
    let priority = result.column_index("rx:priority").expect("priority column");
    assert_eq!(article.values[priority], Value::Null);

    let json = serde_json::to_value(&result).expect("serialize result");
    assert_eq!(json["columns"][0], "sys_contentid");
    Ok(())
}

#[test]
fn locale_sorts_case_insensitively() -> Result<()> {
    let fx = fixture();
    for (cid, title) in [(1, "beta"), (2, "Alpha"), (3, "gamma")] {
        seed_news(&fx.access, cid, title, 0, 20);
    }
    let query = QueryBuilder::of_type("News")
        .select("rx:title")
        .order_by("rx:title", SortDirection::Asc)
        .locale("en_US")
        .build();
    let result = fx.repo.execute(&query)?;
    assert_eq!(
        result.column("rx:title"),
        vec![&Value::from("Alpha"), &Value::from("beta"), &Value::from("gamma")]
    );
    assert!(result.plans[0].sql.contains("COLLATE"));
    Ok(())
}

#[test]
fn caller_names_stay_inside_quoted_identifiers() -> Result<()> {
    let fx = seeded();
    let query = QueryBuilder::of_type("News")
        .select("rx:title\" FROM CT_SECRET --")
        .build();
    let result = fx.repo.execute(&query)?;
    let sql = &result.plans[0].sql;
    assert!(sql.contains("\"\" FROM CT_SECRET --\" FROM CT_NEWS t0"), "{sql}");
    assert_eq!(result.rows.len(), 4);

    let queries = fx.access.stats().queries;
    let hostile = QueryBuilder::of_type("News")
        .select("rx:title")
        .order_by("rx:title", SortDirection::Asc)
        .locale("en\"; DROP TABLE CT_NEWS; --")
        .build();
    let err = fx.repo.execute(&hostile).unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidQuery(QueryError::InvalidCollation { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert_eq!(fx.access.stats().queries, queries);
    Ok(())
}
