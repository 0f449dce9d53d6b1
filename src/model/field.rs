//! Field descriptors: how one aspect of an entity is indexed and queried.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::value::{Value, parse_date};
use crate::error::{Result, SearchError};

/// Default name given to a computed field when none is set.
pub const COMPUTED_FIELD_DEFAULT_NAME: &str = "Value";

/// Read access to a record's properties by name.
///
/// Entities implement this once (usually a `match` over property names);
/// projection rows implement it over their fetched columns.
pub trait Record: Send + Sync {
    fn get(&self, property: &str) -> Option<Value>;
}

pub type ComputedFn = Arc<dyn Fn(&dyn Record) -> Option<Value> + Send + Sync>;

/// Where a field's value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// A direct property of the entity.
    Property(String),
    /// A function over the whole record.
    Computed(ComputedFn),
}

impl FieldSource {
    pub fn evaluate(&self, record: &dyn Record) -> Option<Value> {
        match self {
            FieldSource::Property(name) => record.get(name),
            FieldSource::Computed(f) => f(record),
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, FieldSource::Computed(_))
    }
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Property(name) => f.debug_tuple("Property").field(name).finish(),
            FieldSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum NumericKind {
    #[default]
    None,
    Int32,
    Int64,
    DateEpochMillis,
    DateEpochSeconds,
}

impl NumericKind {
    pub fn is_numeric(self) -> bool {
        self != NumericKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Autocomplete {
    pub min_gram: usize,
    pub max_gram: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub struct TermVectors {
    pub positions: bool,
    pub offsets: bool,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub source: FieldSource,
    pub searchable: bool,
    pub store: bool,
    pub keyword: bool,
    pub lower_case_keyword: bool,
    pub locale: Option<String>,
    pub numeric_kind: NumericKind,
    pub autocomplete: Option<Autocomplete>,
    pub term_vectors: TermVectors,
    /// Properties a computed field reads; lets sync use projection rows.
    pub depends: Vec<String>,
}

impl FieldDescriptor {
    /// Searchable text field bound to the property of the same name.
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_source(name.clone(), FieldSource::Property(name))
    }

    /// Searchable text field computed from the whole record.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&dyn Record) -> Option<Value> + Send + Sync + 'static,
    {
        Self::with_source(
            COMPUTED_FIELD_DEFAULT_NAME,
            FieldSource::Computed(Arc::new(f)),
        )
    }

    fn with_source(name: impl Into<String>, source: FieldSource) -> Self {
        Self {
            name: name.into(),
            source,
            searchable: true,
            store: false,
            keyword: false,
            lower_case_keyword: false,
            locale: None,
            numeric_kind: NumericKind::None,
            autocomplete: None,
            term_vectors: TermVectors::default(),
            depends: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stored(mut self) -> Self {
        self.store = true;
        self
    }

    pub fn store_only(mut self) -> Self {
        self.store = true;
        self.searchable = false;
        self
    }

    pub fn keyword(mut self) -> Self {
        self.keyword = true;
        self
    }

    /// Keyword matched case-insensitively; `locale` tunes the lower-casing.
    pub fn lower_case_keyword(mut self, locale: Option<&str>) -> Self {
        self.keyword = true;
        self.lower_case_keyword = true;
        self.locale = locale.map(str::to_string);
        self
    }

    pub fn numeric(mut self, kind: NumericKind) -> Self {
        self.numeric_kind = kind;
        self
    }

    pub fn autocomplete(mut self, min_gram: usize, max_gram: usize) -> Self {
        self.autocomplete = Some(Autocomplete { min_gram, max_gram });
        self
    }

    pub fn term_vectors(mut self, positions: bool, offsets: bool) -> Self {
        self.term_vectors = TermVectors { positions, offsets };
        self
    }

    pub fn depends_on<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_kind.is_numeric()
    }

    /// Whether the field is written to the inverted index at all.
    pub fn is_indexed(&self) -> bool {
        self.searchable || self.keyword || self.is_numeric()
    }

    /// Tokenized free text (as opposed to keyword or numeric).
    pub fn is_text(&self) -> bool {
        !self.keyword && !self.is_numeric()
    }

    /// Canonical string form of a value for this field.
    ///
    /// This is the single normalization used by both the write path (document
    /// building) and the read path (predicate compilation). Tokenized text is
    /// lower-cased to line up with the default tokenizer's output; keywords are
    /// kept verbatim unless declared case-insensitive.
    pub fn normalize(&self, raw: &str) -> String {
        if self.keyword && !self.lower_case_keyword {
            return raw.to_string();
        }
        lowercase_for_locale(raw, self.locale.as_deref())
    }

    /// Convert an operand to the `i64` the index stores for a numeric field.
    pub fn coerce_numeric(&self, value: &Value) -> Result<i64> {
        let invalid = |reason: String| SearchError::InvalidOperand {
            field: self.name.clone(),
            reason,
        };
        match self.numeric_kind {
            NumericKind::None => Err(invalid("field is not numeric".into())),
            NumericKind::Int32 | NumericKind::Int64 => {
                let n = match value {
                    Value::Int(i) => *i,
                    Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                        // i64::MAX as f64 rounds up to 2^63
                        if *f < i64::MIN as f64 || *f >= i64::MAX as f64 {
                            return Err(invalid(format!("{f} is out of the 64-bit range")));
                        }
                        *f as i64
                    }
                    Value::Text(s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| invalid(format!("`{s}` is not an integer")))?,
                    other => {
                        return Err(invalid(format!(
                            "cannot use a {} value as an integer",
                            other.kind()
                        )));
                    }
                };
                if self.numeric_kind == NumericKind::Int32 && i32::try_from(n).is_err() {
                    return Err(invalid(format!("{n} does not fit in 32 bits")));
                }
                Ok(n)
            }
            NumericKind::DateEpochMillis | NumericKind::DateEpochSeconds => {
                let millis = self.numeric_kind == NumericKind::DateEpochMillis;
                match value {
                    Value::Int(i) => Ok(*i),
                    Value::Date(d) => Ok(if millis {
                        d.timestamp_millis()
                    } else {
                        d.timestamp()
                    }),
                    Value::Text(s) => {
                        let d = parse_date(s)
                            .ok_or_else(|| invalid(format!("`{s}` is not a date")))?;
                        Ok(if millis {
                            d.timestamp_millis()
                        } else {
                            d.timestamp()
                        })
                    }
                    other => Err(invalid(format!(
                        "cannot use a {} value as a date",
                        other.kind()
                    ))),
                }
            }
        }
    }

    /// Stable summary of everything that shapes the engine schema.
    pub(crate) fn fingerprint_parts(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{:?}|{:?}|{:?}|{:?}",
            self.name,
            self.searchable,
            self.store,
            self.keyword,
            self.lower_case_keyword,
            self.locale,
            self.numeric_kind,
            self.autocomplete,
            self.term_vectors,
        )
    }
}

/// Lower-case `raw`, applying the Turkish/Azeri dotted-i rules when asked.
pub fn lowercase_for_locale(raw: &str, locale: Option<&str>) -> String {
    let turkic = locale.is_some_and(|l| {
        let l = l.to_ascii_lowercase();
        l == "tr" || l == "az" || l.starts_with("tr-") || l.starts_with("az-")
    });
    if !turkic {
        return raw.to_lowercase();
    }
    raw.chars()
        .flat_map(|c| match c {
            'I' => vec!['ı'],
            'İ' => vec!['i'],
            other => other.to_lowercase().collect(),
        })
        .collect()
}
