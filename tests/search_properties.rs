mod util;

use std::collections::HashSet;

use async_trait::async_trait;
use entity_search::predicate::{Occur, QueryNode, RawPredicate, TermValue, compile, field};
use entity_search::search::{FilterProvider, FnFilter, SearchFilterContext};
use entity_search::indexer::SearchDocument;
use entity_search::model::{
    EntitySearchDescriptor, FieldDescriptor, NumericKind, SchemaRegistry, Value,
};
use entity_search::{SearchConfig, SearchError, SearchInput, SearchService};
use tempfile::TempDir;
use util::{Book, TestTracing, index_books, numbered_books, service, two_books};

fn ids(results: &entity_search::SearchResults) -> HashSet<String> {
    results.items.iter().map(|h| h.entity_id.clone()).collect()
}

fn code_predicate(expr: entity_search::Expr) -> RawPredicate {
    RawPredicate::new("Book", expr)
}

#[tokio::test]
async fn exact_keyword_match_returns_only_holders() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    let mut books = two_books();
    books.push(Book::new("3", "Elasticsearch Basics", "B001", 200));
    index_books(&svc, &books);

    let input = SearchInput::default()
        .page(0, 10)
        .with_predicate(code_predicate(field("code").eq("B001")));
    let results = svc.search("Book", input).await.unwrap();

    assert_eq!(results.total_count, 2);
    assert_eq!(ids(&results), HashSet::from(["1".to_string(), "3".to_string()]));
}

#[tokio::test]
async fn prefix_results_cover_exact_results() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let exact = svc
        .search("Book", SearchInput::new("\"Lucene in Action\""))
        .await
        .unwrap();
    let prefixed = svc
        .search("Book", SearchInput::new("Lucen").prefix())
        .await
        .unwrap();

    assert!(!exact.items.is_empty());
    assert!(ids(&prefixed).is_superset(&ids(&exact)));
    assert_eq!(prefixed.total_count, 2);
}

#[tokio::test]
async fn fuzzy_tolerates_one_dropped_character() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let strict = svc.search("Book", SearchInput::new("Lucne")).await.unwrap();
    assert_eq!(strict.total_count, 0);

    let fuzzy = svc
        .search("Book", SearchInput::new("Lucne").fuzzy())
        .await
        .unwrap();
    assert_eq!(fuzzy.total_count, 2);
}

#[tokio::test]
async fn numeric_range_bounds_are_honoured() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(
        &svc,
        &[
            Book::new("a", "Short", "S1", 5),
            Book::new("b", "Medium", "M1", 20),
            Book::new("c", "Long", "L1", 100),
        ],
    );

    let inclusive = field("pages").ge(10).and(field("pages").le(100));
    let results = svc
        .search("Book", SearchInput::default().with_predicate(code_predicate(inclusive)))
        .await
        .unwrap();
    assert_eq!(ids(&results), HashSet::from(["b".to_string(), "c".to_string()]));

    let exclusive_upper = field("pages").ge(10).and(field("pages").lt(100));
    let results = svc
        .search(
            "Book",
            SearchInput::default().with_predicate(code_predicate(exclusive_upper)),
        )
        .await
        .unwrap();
    assert_eq!(ids(&results), HashSet::from(["b".to_string()]));
}

#[tokio::test]
async fn lower_case_keyword_membership_ignores_case() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(
        &svc,
        &[
            Book::new("1", "First", "b001", 10),
            Book::new("2", "Second", "B002", 10),
            Book::new("3", "Third", "B003", 10),
        ],
    );

    let membership = field("code").contained_in(vec!["B001", "B002"]);
    let results = svc
        .search("Book", SearchInput::default().with_predicate(code_predicate(membership)))
        .await
        .unwrap();
    assert_eq!(ids(&results), HashSet::from(["1".to_string(), "2".to_string()]));
}

#[tokio::test]
async fn empty_membership_matches_nothing() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let empty = field("code").contained_in(Vec::<String>::new());
    let results = svc
        .search("Book", SearchInput::default().with_predicate(code_predicate(empty)))
        .await
        .unwrap();
    assert_eq!(results.total_count, 0);

    // the raw primitive too, not just the compiled form
    let svc = svc.with_filter_provider(FnFilter::new(|_: &mut SearchFilterContext| {
        Ok(Some(QueryNode::MultiTerm {
            field: "code".into(),
            values: Vec::new(),
            match_any: true,
        }))
    }));
    let results = svc.search("Book", SearchInput::default()).await.unwrap();
    assert_eq!(results.total_count, 0);
}

#[tokio::test]
async fn pages_do_not_overlap() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &numbered_books(12));

    let k = 4;
    let first = svc
        .search("Book", SearchInput::new("series").page(0, k))
        .await
        .unwrap();
    let second = svc
        .search("Book", SearchInput::new("series").page(k, k))
        .await
        .unwrap();
    let both = svc
        .search("Book", SearchInput::new("series").page(0, 2 * k))
        .await
        .unwrap();

    let a = ids(&first);
    let b = ids(&second);
    assert_eq!(a.len(), k);
    assert_eq!(b.len(), k);
    assert!(a.is_disjoint(&b));
    assert_eq!(&a | &b, ids(&both));
    assert_eq!(first.total_count, 12);
}

#[tokio::test]
async fn skip_past_every_hit_returns_only_the_total() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let results = svc
        .search("Book", SearchInput::new("lucene").page(1usize << 40, 10))
        .await
        .unwrap();
    assert_eq!(results.total_count, 2);
    assert!(results.items.is_empty());

    let all = svc
        .search("Book", SearchInput::new("lucene").page(0, usize::MAX))
        .await
        .unwrap();
    assert_eq!(all.items.len(), 2);
}

#[tokio::test]
async fn filter_provider_narrows_text_results() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).with_filter_provider(FnFilter::new(|ctx: &mut SearchFilterContext| {
        let node = compile(&ctx.descriptor, &field("code").eq("B001"))?;
        Ok(Some(node))
    }));
    index_books(&svc, &two_books());

    let results = svc.search("Book", SearchInput::new("Lucene")).await.unwrap();
    assert_eq!(results.total_count, 1);
    assert_eq!(results.items[0].entity_id, "1");
    assert_eq!(
        results.items[0].payload.get("title").map(String::as_str),
        Some("Lucene in Action")
    );
}

/// Leaves a predicate on the context instead of returning a fragment.
struct CodeFromTenant;

#[async_trait]
impl FilterProvider for CodeFromTenant {
    async fn filter(&self, ctx: &mut SearchFilterContext) -> anyhow::Result<Option<QueryNode>> {
        ctx.predicate = Some(RawPredicate::new(
            ctx.entity_type.clone(),
            field("code").eq("b002"),
        ));
        Ok(None)
    }
}

#[tokio::test]
async fn provider_predicate_is_compiled_as_fallback() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).with_filter_provider(CodeFromTenant);
    index_books(&svc, &two_books());

    let results = svc.search("Book", SearchInput::new("Lucene")).await.unwrap();
    assert_eq!(results.ids(), ["2"]);
}

#[tokio::test]
async fn broken_predicate_degrades_to_unfiltered_search() {
    let tracing = TestTracing::new();
    let _guard = tracing.install();
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let bad = code_predicate(field("isbn").eq("x"));
    let results = svc
        .search("Book", SearchInput::new("Lucene").with_predicate(bad))
        .await
        .unwrap();
    assert_eq!(results.total_count, 2);
    tracing.assert_contains("predicate could not be compiled");
}

#[tokio::test]
async fn provider_errors_fail_the_search() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir).with_filter_provider(FnFilter::new(|_: &mut SearchFilterContext| {
        anyhow::bail!("permission lookup failed")
    }));
    index_books(&svc, &two_books());

    let err = svc.search("Book", SearchInput::new("Lucene")).await.unwrap_err();
    assert!(matches!(err, SearchError::FilterProvider(_)));
}

#[tokio::test]
async fn unknown_entity_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    let err = svc.search("Author", SearchInput::new("x")).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn fragments_from_several_providers_all_apply() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir)
        .with_filter_provider(FnFilter::new(|_: &mut SearchFilterContext| {
            Ok(Some(QueryNode::Range {
                field: "pages".into(),
                lower: Some(TermValue::Int(300)),
                upper: None,
                include_lower: true,
                include_upper: false,
            }))
        }))
        .with_filter_provider(FnFilter::new(|_: &mut SearchFilterContext| {
            Ok(Some(QueryNode::Boolean {
                clauses: vec![
                    (
                        QueryNode::Term {
                            field: "code".into(),
                            value: TermValue::Text("b002".into()),
                        },
                        Occur::Should,
                    ),
                    (
                        QueryNode::Term {
                            field: "code".into(),
                            value: TermValue::Text("b003".into()),
                        },
                        Occur::Should,
                    ),
                ],
                minimum_should_match: 1,
            }))
        }));
    index_books(&svc, &two_books());

    let results = svc.search("Book", SearchInput::default()).await.unwrap();
    assert_eq!(results.ids(), ["2"]);
}

#[tokio::test]
async fn search_many_concatenates_and_sums() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let results = svc
        .search_many(&["Book", "Book"], SearchInput::new("Lucene"))
        .await
        .unwrap();
    assert_eq!(results.total_count, 4);
    assert_eq!(results.items.len(), 4);
}

#[tokio::test]
async fn hits_serialize_with_payload() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    index_books(&svc, &two_books());

    let results = svc
        .search("Book", SearchInput::default().with_predicate(code_predicate(field("code").eq("B002"))))
        .await
        .unwrap();
    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json["total_count"], 1);
    assert_eq!(json["items"][0]["entity_id"], "2");
    assert_eq!(json["items"][0]["payload"]["code"], "b002");
    assert_eq!(json["items"][0]["payload"]["pages"], "320");
}

fn article_descriptor() -> EntitySearchDescriptor {
    EntitySearchDescriptor::builder("Article")
        .id_field(FieldDescriptor::property("id"))
        .field(FieldDescriptor::property("title").stored().autocomplete(2, 6))
        .field(FieldDescriptor::property("slug").keyword().stored())
        .field(
            FieldDescriptor::property("at")
                .numeric(NumericKind::DateEpochMillis)
                .stored(),
        )
        .build()
        .unwrap()
}

/// Two articles indexed through the write gateway.
fn article_service(dir: &TempDir) -> SearchService {
    let registry = SchemaRegistry::builder()
        .register(article_descriptor())
        .unwrap()
        .build();
    let svc = SearchService::new(SearchConfig::with_root(dir.path()), registry);
    let d = svc.schema().get("Article").unwrap();
    let rows = [
        ("1", "Lucene in Action", "ab-101", "2024-03-01"),
        ("2", "Search Engines", "cd-202", "2023-06-15"),
    ];
    let docs: Vec<SearchDocument> = rows
        .iter()
        .map(|(id, title, slug, at)| {
            SearchDocument::from_values(
                &d,
                vec![
                    ("id".into(), Value::from(*id)),
                    ("title".into(), Value::from(*title)),
                    ("slug".into(), Value::from(*slug)),
                    ("at".into(), Value::from(*at)),
                ],
            )
            .unwrap()
        })
        .collect();
    svc.gateway().upsert_many(&d, &docs, false).unwrap();
    svc
}

async fn article_ids(svc: &SearchService, expr: entity_search::Expr) -> Vec<String> {
    let input = SearchInput::default().with_predicate(RawPredicate::new("Article", expr));
    let results = svc.search("Article", input).await.unwrap();
    let mut ids: Vec<String> = results.items.into_iter().map(|h| h.entity_id).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn string_patterns_run_against_the_index() {
    let dir = TempDir::new().unwrap();
    let svc = article_service(&dir);

    assert_eq!(article_ids(&svc, field("title").contains("ucen")).await, ["1"]);
    assert_eq!(article_ids(&svc, field("title").ends_with("tion")).await, ["1"]);
    assert_eq!(article_ids(&svc, field("title").starts_with("Eng")).await, ["2"]);
    assert_eq!(article_ids(&svc, field("slug").starts_with("ab-")).await, ["1"]);
    assert!(article_ids(&svc, field("slug").starts_with("AB-")).await.is_empty());
}

#[tokio::test]
async fn date_fields_compare_against_date_strings() {
    let dir = TempDir::new().unwrap();
    let svc = article_service(&dir);

    assert_eq!(article_ids(&svc, field("at").ge("2024-01-01")).await, ["1"]);
    assert_eq!(article_ids(&svc, field("at").lt("2024-01-01")).await, ["2"]);
    assert_eq!(
        article_ids(&svc, field("at").ge("2023-01-01").and(field("at").le("2024-12-31"))).await,
        ["1", "2"]
    );
}

#[tokio::test]
async fn autocomplete_grams_only_serve_prefix_searches() {
    let dir = TempDir::new().unwrap();
    let svc = article_service(&dir);
    let count = |input: SearchInput| {
        let svc = &svc;
        async move { svc.search("Article", input).await.unwrap().total_count }
    };

    assert_eq!(count(SearchInput::new("Luc")).await, 0);
    assert_eq!(count(SearchInput::new("Lucenezzzz")).await, 0);
    assert_eq!(count(SearchInput::new("Luc").prefix()).await, 1);
    assert_eq!(count(SearchInput::new("Lucene")).await, 1);
}
