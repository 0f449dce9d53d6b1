//! Search inputs, results, and query execution against one index.

use std::collections::BTreeMap;

use serde::Serialize;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, Query};
use tantivy::schema::Value as _;
use tantivy::{DocAddress, Searcher, TantivyDocument};

use super::tantivy::TantivyIndex;
use crate::error::Result;
use crate::model::EntitySearchDescriptor;
use crate::predicate::RawPredicate;

pub const DEFAULT_MAX_RESULT_COUNT: usize = 10;

/// Caller input for one search.
#[derive(Debug, Clone)]
pub struct SearchInput {
    /// Free text; blank matches every document.
    pub query: String,
    /// Also match terms starting with each query word.
    pub prefix: bool,
    /// Also match terms within the configured edit distance.
    pub fuzzy: bool,
    pub skip_count: usize,
    pub max_result_count: usize,
    /// Structured filter compiled against the entity's descriptor.
    pub predicate: Option<RawPredicate>,
}

impl Default for SearchInput {
    fn default() -> Self {
        Self {
            query: String::new(),
            prefix: false,
            fuzzy: false,
            skip_count: 0,
            max_result_count: DEFAULT_MAX_RESULT_COUNT,
            predicate: None,
        }
    }
}

impl SearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn fuzzy(mut self) -> Self {
        self.fuzzy = true;
        self
    }

    pub fn page(mut self, skip_count: usize, max_result_count: usize) -> Self {
        self.skip_count = skip_count;
        self.max_result_count = max_result_count;
        self
    }

    pub fn with_predicate(mut self, predicate: RawPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub entity_id: String,
    pub score: f32,
    /// Stored field values by field name.
    pub payload: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Every match of the query, not just this page.
    pub total_count: u64,
    pub items: Vec<SearchHit>,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|h| h.entity_id.as_str()).collect()
    }

    /// Append `other`'s hits and add its total. Hits are not re-ranked.
    pub fn merge(&mut self, other: SearchResults) {
        self.total_count += other.total_count;
        self.items.extend(other.items);
    }
}

/// Run `query` on a fresh reader and return the page `[skip, skip + take)`.
pub fn execute(
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    query: &dyn Query,
    skip: usize,
    take: usize,
) -> Result<SearchResults> {
    let searcher = index.reader()?.searcher();
    // the collector allocates for its whole limit up front
    let num_docs = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
    let limit = skip.saturating_add(take).min(num_docs);
    if take == 0 || skip >= limit {
        let total = searcher.search(query, &Count)?;
        return Ok(SearchResults {
            total_count: total as u64,
            items: Vec::new(),
        });
    }

    let (top, total) = searcher.search(query, &(TopDocs::with_limit(limit), Count))?;
    let mut items = Vec::with_capacity(top.len().saturating_sub(skip));
    for (score, addr) in top.into_iter().skip(skip).take(take) {
        items.push(hydrate(&searcher, index, descriptor, addr, score)?);
    }
    Ok(SearchResults {
        total_count: total as u64,
        items,
    })
}

/// Up to `take` documents in index order, unscored.
pub fn dump(
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    take: usize,
) -> Result<SearchResults> {
    let searcher = index.reader()?.searcher();
    let total_count = searcher.num_docs();
    let take = take.min(usize::try_from(total_count).unwrap_or(usize::MAX));
    if take == 0 {
        return Ok(SearchResults {
            total_count,
            items: Vec::new(),
        });
    }
    let top = searcher.search(&AllQuery, &TopDocs::with_limit(take))?;
    let mut items = Vec::with_capacity(top.len());
    for (_, addr) in top {
        items.push(hydrate(&searcher, index, descriptor, addr, 0.0)?);
    }
    Ok(SearchResults { total_count, items })
}

fn hydrate(
    searcher: &Searcher,
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    addr: DocAddress,
    score: f32,
) -> Result<SearchHit> {
    let doc: TantivyDocument = searcher.doc(addr)?;
    let entity_id = doc
        .get_first(index.id_field())
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut payload = BTreeMap::new();
    for fd in descriptor.stored_fields() {
        let Ok(field) = index.field(&fd.name) else {
            continue;
        };
        let Some(value) = doc.get_first(field) else {
            continue;
        };
        let text = match (value.as_str(), value.as_i64()) {
            (Some(s), _) => s.to_string(),
            (None, Some(i)) => i.to_string(),
            (None, None) => continue,
        };
        payload.insert(fd.name.clone(), text);
    }

    Ok(SearchHit {
        entity_id,
        score,
        payload,
    })
}
