mod support;

use proptest::prelude::*;
use support::{fixture, seed_article, seed_news};
use typeforge::query::{CompareOp, Expr};
use typeforge::{QueryBuilder, Value};

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

/// Expression over a property no registered type declares, wrapped in
/// negations and single-item connectives.
fn arb_unknown_expr() -> impl Strategy<Value = Expr> {
    let leaf = ("[a-z]{3,8}", arb_op(), any::<i64>()).prop_map(|(name, op, v)| {
        Expr::compare(format!("rx:zz_{name}"), op, Value::Long(v))
    });
    leaf.prop_recursive(4, 16, 1, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
            inner.clone().prop_map(|e| Expr::And(vec![e])),
            inner.prop_map(|e| Expr::Or(vec![e])),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn truncation_returns_min_of_limit_and_total(
        articles in 0usize..5,
        news in 0usize..5,
        max in 0usize..12,
    ) {
        let fx = fixture();
        for i in 0..articles {
            seed_article(&fx.access, 100 + i as i64, 1, &format!("a{i}"), 10);
        }
        for i in 0..news {
            seed_news(&fx.access, 200 + i as i64, &format!("n{i}"), i as i64, 20);
        }
        let query = QueryBuilder::any().select("rx:title").max_results(max).build();
        let result = fx.repo.execute(&query).unwrap();
        let total = articles + news;
        let expected = if max == 0 { total } else { total.min(max) };
        prop_assert_eq!(result.rows.len(), expected);

        // Rows of the first type come first.
        let first_news = result.rows.iter().position(|r| r.content_type == support::NEWS);
        if let Some(pos) = first_news {
            prop_assert!(result.rows[pos..].iter().all(|r| r.content_type == support::NEWS));
        }
    }

    #[test]
    fn unknown_property_predicates_match_nothing(expr in arb_unknown_expr()) {
        let fx = fixture();
        seed_article(&fx.access, 1, 1, "x", 10);
        seed_news(&fx.access, 2, "y", 1, 20);
        let query = QueryBuilder::any().filter(expr).select("rx:title").build();
        let result = fx.repo.execute(&query).unwrap();
        prop_assert!(result.rows.is_empty());
        prop_assert!(result.plans.iter().all(|p| p.degenerate));
    }
}
