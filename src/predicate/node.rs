//! Engine-neutral query primitives and their lowering to tantivy queries.

use std::ops::Bound;

use tantivy::Term;
use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, Occur as EngineOccur, Query, RangeQuery, RegexQuery,
    TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, IndexRecordOption};

use crate::error::{Result, SearchError};
use crate::search::tantivy::TantivyIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
}

/// An already-normalized operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermValue {
    Int(i64),
    Text(String),
}

impl TermValue {
    fn to_term(&self, field: Field) -> Term {
        match self {
            TermValue::Int(n) => Term::from_field_i64(field, *n),
            TermValue::Text(s) => Term::from_field_text(field, s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Matches every document. Only produced by the text query builder.
    All,
    Term {
        field: String,
        value: TermValue,
    },
    Range {
        field: String,
        lower: Option<TermValue>,
        upper: Option<TermValue>,
        include_lower: bool,
        include_upper: bool,
    },
    Prefix {
        field: String,
        value: String,
    },
    /// `*` matches any run of characters, `?` exactly one; `\` escapes.
    Wildcard {
        field: String,
        pattern: String,
    },
    MultiTerm {
        field: String,
        values: Vec<TermValue>,
        match_any: bool,
    },
    Boolean {
        clauses: Vec<(QueryNode, Occur)>,
        minimum_should_match: usize,
    },
}

impl QueryNode {
    pub fn must(clauses: Vec<QueryNode>) -> Self {
        QueryNode::Boolean {
            clauses: clauses.into_iter().map(|c| (c, Occur::Must)).collect(),
            minimum_should_match: 0,
        }
    }

    pub fn should(clauses: Vec<QueryNode>) -> Self {
        QueryNode::Boolean {
            clauses: clauses.into_iter().map(|c| (c, Occur::Should)).collect(),
            minimum_should_match: 1,
        }
    }

    /// A query matching no document.
    pub fn nothing() -> Self {
        Self::should(Vec::new())
    }

    /// AND `other` onto this node, flattening into an existing Must group.
    pub fn and(self, other: QueryNode) -> Self {
        match self {
            QueryNode::Boolean {
                mut clauses,
                minimum_should_match: 0,
            } if clauses.iter().all(|(_, o)| *o == Occur::Must) => {
                clauses.push((other, Occur::Must));
                QueryNode::Boolean {
                    clauses,
                    minimum_should_match: 0,
                }
            }
            node => Self::must(vec![node, other]),
        }
    }

    /// Lower to a tantivy query against `index`.
    pub fn to_query(&self, index: &TantivyIndex) -> Result<Box<dyn Query>> {
        match self {
            QueryNode::All => Ok(Box::new(AllQuery)),
            QueryNode::Term { field, value } => {
                let term = value.to_term(index.field(field)?);
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
            }
            QueryNode::Range {
                field,
                lower,
                upper,
                include_lower,
                include_upper,
            } => {
                let f = index.field(field)?;
                let bound = |v: &Option<TermValue>, inclusive: bool| match v {
                    None => Bound::Unbounded,
                    Some(v) if inclusive => Bound::Included(v.to_term(f)),
                    Some(v) => Bound::Excluded(v.to_term(f)),
                };
                Ok(Box::new(RangeQuery::new(
                    bound(lower, *include_lower),
                    bound(upper, *include_upper),
                )))
            }
            QueryNode::Prefix { field, value } => {
                let pattern = format!("{}.*", regex::escape(value));
                Ok(Box::new(RegexQuery::from_pattern(
                    &pattern,
                    index.field(field)?,
                )?))
            }
            QueryNode::Wildcard { field, pattern } => Ok(Box::new(RegexQuery::from_pattern(
                &wildcard_to_regex(pattern),
                index.field(field)?,
            )?)),
            QueryNode::MultiTerm {
                field,
                values,
                match_any,
            } => {
                let f = index.field(field)?;
                if values.is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                if *match_any {
                    Ok(Box::new(TermSetQuery::new(
                        values.iter().map(|v| v.to_term(f)),
                    )))
                } else {
                    let clauses = values
                        .iter()
                        .map(|v| {
                            let q: Box<dyn Query> =
                                Box::new(TermQuery::new(v.to_term(f), IndexRecordOption::Basic));
                            (EngineOccur::Must, q)
                        })
                        .collect();
                    Ok(Box::new(BooleanQuery::new(clauses)))
                }
            }
            QueryNode::Boolean {
                clauses,
                minimum_should_match,
            } => lower_boolean(clauses, *minimum_should_match, index),
        }
    }
}

fn lower_boolean(
    clauses: &[(QueryNode, Occur)],
    minimum_should_match: usize,
    index: &TantivyIndex,
) -> Result<Box<dyn Query>> {
    if clauses.is_empty() {
        return Ok(Box::new(EmptyQuery));
    }
    if minimum_should_match > 1 {
        return Err(SearchError::Unsupported(format!(
            "minimum_should_match of {minimum_should_match}"
        )));
    }

    let mut must = Vec::new();
    let mut should = Vec::new();
    for (node, occur) in clauses {
        let q = node.to_query(index)?;
        match occur {
            Occur::Must => must.push((EngineOccur::Must, q)),
            Occur::Should => should.push((EngineOccur::Should, q)),
        }
    }

    if must.is_empty() {
        return Ok(Box::new(BooleanQuery::new(should)));
    }
    if !should.is_empty() {
        if minimum_should_match >= 1 {
            // tantivy treats Should as optional next to Must; group them so
            // at least one has to match
            let grouped: Box<dyn Query> = Box::new(BooleanQuery::new(should));
            must.push((EngineOccur::Must, grouped));
        } else {
            must.extend(should);
        }
    }
    Ok(Box::new(BooleanQuery::new(must)))
}

/// Translate a `*`/`?` wildcard pattern to an anchored regex.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(escaped.encode_utf8(&mut buf)));
                } else {
                    out.push_str(r"\\");
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out
}

/// Escape the wildcard metacharacters in literal text.
pub fn escape_wildcard(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
