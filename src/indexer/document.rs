//! Documents as the write path sees them: descriptor fields evaluated
//! against a record, ready to be turned into tantivy documents.

use tantivy::TantivyDocument;

use crate::error::{Result, SearchError};
use crate::model::{EntitySearchDescriptor, FieldDescriptor, Record, Value};
use crate::search::tantivy::TantivyIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    id: String,
    values: Vec<(String, Value)>,
}

impl SearchDocument {
    /// Evaluate every field of `descriptor` against `record`.
    pub fn from_record(descriptor: &EntitySearchDescriptor, record: &dyn Record) -> Result<Self> {
        let mut values = Vec::with_capacity(descriptor.fields().len());
        for fd in descriptor.fields() {
            match fd.source.evaluate(record) {
                None | Some(Value::Null) => {}
                Some(v) => values.push((fd.name.clone(), v)),
            }
        }
        Self::from_values(descriptor, values)
    }

    /// Build from already-evaluated `(field, value)` pairs.
    pub fn from_values(
        descriptor: &EntitySearchDescriptor,
        values: Vec<(String, Value)>,
    ) -> Result<Self> {
        let id_name = descriptor.id_field_name();
        let id = values
            .iter()
            .find(|(name, _)| name == id_name)
            .and_then(|(_, v)| v.to_index_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SearchError::MissingId {
                entity: descriptor.entity_type().to_string(),
                field: id_name.to_string(),
            })?;
        Ok(Self { id, values })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    pub(crate) fn to_tantivy(
        &self,
        descriptor: &EntitySearchDescriptor,
        index: &TantivyIndex,
    ) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::default();
        for (name, value) in &self.values {
            let fd = descriptor.require_field(name)?;
            let field = index.field(name)?;
            let ac_field = index.autocomplete_field(name);
            for scalar in flatten(value) {
                if fd.is_numeric() {
                    doc.add_i64(field, fd.coerce_numeric(scalar)?);
                    continue;
                }
                let Some(text) = scalar.to_index_string() else {
                    continue;
                };
                doc.add_text(field, stored_text(fd, &text));
                if let Some(ac) = ac_field {
                    for word in text.split_whitespace() {
                        doc.add_text(ac, word);
                    }
                }
            }
        }
        Ok(doc)
    }
}

/// Keywords are written already normalized; tokenized text goes in as-is and
/// the analyzer lower-cases it.
fn stored_text(fd: &FieldDescriptor, text: &str) -> String {
    if fd.keyword {
        fd.normalize(text)
    } else {
        text.to_string()
    }
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(items) => items.iter().flat_map(flatten).collect(),
        Value::Null => Vec::new(),
        scalar => vec![scalar],
    }
}
