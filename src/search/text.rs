//! Free-text query synthesis: literal, prefix and fuzzy variants over the
//! searchable text fields. Prefix searches also consult the autocomplete
//! sub-fields.

use tantivy::Term;
use tantivy::query::{AllQuery, BooleanQuery, EmptyQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};

use super::tantivy::TantivyIndex;
use crate::config::{MAX_FUZZY_EDITS, SearchConfig, TextOperator};
use crate::model::EntitySearchDescriptor;
use crate::model::field::lowercase_for_locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Literal,
    Prefix,
    Fuzzy(u8),
}

impl Variant {
    fn name(self) -> &'static str {
        match self {
            Variant::Literal => "literal",
            Variant::Prefix => "prefix",
            Variant::Fuzzy(_) => "fuzzy",
        }
    }
}

/// Build the text query for `raw`.
///
/// A blank string matches every document. Variants that fail to parse are
/// logged and dropped; if none survives the query matches nothing.
pub fn build_text_query(
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    config: &SearchConfig,
    raw: &str,
    prefix: bool,
    fuzzy: bool,
) -> Box<dyn Query> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Box::new(AllQuery);
    }

    let fields: Vec<Field> = descriptor
        .text_search_fields()
        .filter_map(|fd| index.field(&fd.name).ok())
        .collect();

    let mut variants = vec![Variant::Literal];
    if prefix {
        variants.push(Variant::Prefix);
    }
    let edits = config.fuzzy_max_edits.min(MAX_FUZZY_EDITS);
    if fuzzy && edits > 0 {
        variants.push(Variant::Fuzzy(edits));
    }

    let mut parsed: Vec<Box<dyn Query>> = Vec::with_capacity(variants.len() + 1);
    for variant in variants {
        let parser = parser_for(index, &fields, config.default_operator, variant);
        match parser.parse_query(raw) {
            Ok(q) => parsed.push(q),
            Err(e) => tracing::warn!(
                entity = descriptor.entity_type(),
                variant = variant.name(),
                query = raw,
                error = %e,
                "text query variant failed to parse"
            ),
        }
    }
    if prefix {
        parsed.extend(autocomplete_query(index, descriptor, raw));
    }

    match parsed.len() {
        0 => {
            tracing::warn!(
                entity = descriptor.entity_type(),
                query = raw,
                "no text query variant parsed; matching nothing"
            );
            Box::new(EmptyQuery)
        }
        1 => parsed.remove(0),
        _ => Box::new(BooleanQuery::new(
            parsed.into_iter().map(|q| (Occur::Should, q)).collect(),
        )),
    }
}

fn parser_for(
    index: &TantivyIndex,
    fields: &[Field],
    operator: TextOperator,
    variant: Variant,
) -> QueryParser {
    let mut parser = QueryParser::for_index(&index.index, fields.to_vec());
    if operator == TextOperator::And {
        parser.set_conjunction_by_default();
    }
    match variant {
        Variant::Literal => {}
        Variant::Prefix => {
            for &f in fields {
                parser.set_field_fuzzy(f, true, 0, true);
            }
        }
        Variant::Fuzzy(edits) => {
            for &f in fields {
                parser.set_field_fuzzy(f, false, edits, true);
            }
        }
    }
    parser
}

/// Term lookups on the edge-n-gram sub-fields, one per query word. Words
/// outside the indexed gram range cannot be a stored gram and are skipped.
fn autocomplete_query(
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    raw: &str,
) -> Option<Box<dyn Query>> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
    for fd in descriptor.fields() {
        let (Some(ac), Some(field)) = (fd.autocomplete, index.autocomplete_field(&fd.name)) else {
            continue;
        };
        for word in raw.split_whitespace() {
            let gram = lowercase_for_locale(word, None);
            let len = gram.chars().count();
            if len < ac.min_gram || len > ac.max_gram {
                continue;
            }
            let q: Box<dyn Query> = Box::new(TermQuery::new(
                Term::from_field_text(field, &gram),
                IndexRecordOption::Basic,
            ));
            clauses.push((Occur::Should, q));
        }
    }
    (!clauses.is_empty()).then(|| Box::new(BooleanQuery::new(clauses)) as Box<dyn Query>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::SearchDocument;
    use crate::model::{FieldDescriptor, Value};

    fn descriptor() -> EntitySearchDescriptor {
        EntitySearchDescriptor::builder("Book")
            .id_field(FieldDescriptor::property("id"))
            .field(FieldDescriptor::property("title").stored())
            .build()
            .unwrap()
    }

    #[test]
    fn blank_query_matches_everything() {
        let d = descriptor();
        let index = TantivyIndex::create_in_ram(&d).unwrap();
        let q = build_text_query(&index, &d, &SearchConfig::default(), "   ", true, true);
        assert!(format!("{q:?}").contains("AllQuery"));
    }

    fn autocomplete_descriptor() -> EntitySearchDescriptor {
        EntitySearchDescriptor::builder("Book")
            .id_field(FieldDescriptor::property("id"))
            .field(FieldDescriptor::property("title").stored().autocomplete(2, 6))
            .build()
            .unwrap()
    }

    fn count(index: &TantivyIndex, q: &dyn Query) -> usize {
        let searcher = index.reader().unwrap().searcher();
        searcher.search(q, &tantivy::collector::Count).unwrap()
    }

    #[test]
    fn autocomplete_joins_only_prefix_searches() {
        let d = autocomplete_descriptor();
        let index = TantivyIndex::create_in_ram(&d).unwrap();
        let mut writer = index.writer(15_000_000).unwrap();
        let doc = SearchDocument::from_values(
            &d,
            vec![
                ("id".into(), Value::from("1")),
                ("title".into(), Value::from("Lucene in Action")),
            ],
        )
        .unwrap();
        writer.add_document(doc.to_tantivy(&d, &index).unwrap()).unwrap();
        writer.commit().unwrap();

        let cfg = SearchConfig::default();
        let literal = build_text_query(&index, &d, &cfg, "Luc", false, false);
        assert_eq!(count(&index, literal.as_ref()), 0);
        let overlong = build_text_query(&index, &d, &cfg, "Lucenezzzz", false, false);
        assert_eq!(count(&index, overlong.as_ref()), 0);
        let prefixed = build_text_query(&index, &d, &cfg, "Luc", true, false);
        assert_eq!(count(&index, prefixed.as_ref()), 1);
    }

    #[test]
    fn overlong_words_skip_the_gram_lookup() {
        let d = autocomplete_descriptor();
        let index = TantivyIndex::create_in_ram(&d).unwrap();
        assert!(autocomplete_query(&index, &d, "lucenezzzz").is_none());
        assert!(autocomplete_query(&index, &d, "l").is_none());
        assert!(autocomplete_query(&index, &d, "lucene").is_some());
    }

    #[test]
    fn unparseable_query_matches_nothing() {
        let d = descriptor();
        let index = TantivyIndex::create_in_ram(&d).unwrap();
        // unknown field prefix fails in every variant
        let q = build_text_query(&index, &d, &SearchConfig::default(), "nope:x", true, true);
        assert!(format!("{q:?}").contains("EmptyQuery"));
    }
}
