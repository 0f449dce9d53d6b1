//! Per-entity search descriptors.

use std::collections::HashSet;

use super::field::FieldDescriptor;
use crate::error::{Result, SearchError};

/// Everything the search layer knows about one indexed entity type.
///
/// Built once through [`EntitySearchDescriptor::builder`] and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct EntitySearchDescriptor {
    entity_type: String,
    index_name: String,
    id_field_name: String,
    id_index: usize,
    fields: Vec<FieldDescriptor>,
}

impl EntitySearchDescriptor {
    pub fn builder(entity_type: impl Into<String>) -> DescriptorBuilder {
        let entity_type = entity_type.into();
        DescriptorBuilder {
            index_name: entity_type.to_lowercase(),
            entity_type,
            id_field_name: None,
            fields: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn id_field_name(&self) -> &str {
        &self.id_field_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_field(&self) -> &FieldDescriptor {
        &self.fields[self.id_index]
    }

    /// Resolve a field by exact name or fail with a configuration error.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| SearchError::UnknownField {
            entity: self.entity_type.clone(),
            field: name.to_string(),
        })
    }

    pub fn stored_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.store)
    }

    /// Fields the free-text parser searches: searchable and not numeric.
    pub fn text_search_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|f| f.searchable && !f.is_numeric())
    }

    pub fn has_computed_fields(&self) -> bool {
        self.fields.iter().any(|f| f.source.is_computed())
    }

    /// Hash of the engine-relevant shape of this descriptor.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.id_field_name.as_bytes());
        for field in &self.fields {
            hasher.update(b"\n");
            hasher.update(field.fingerprint_parts().as_bytes());
        }
        hasher.finalize()
    }
}

#[derive(Debug)]
pub struct DescriptorBuilder {
    entity_type: String,
    index_name: String,
    id_field_name: Option<String>,
    fields: Vec<FieldDescriptor>,
}

impl DescriptorBuilder {
    /// Physical index name; defaults to the lower-cased entity type.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = name.into();
        self
    }

    /// Declare the identity field. It is stored and indexed as a keyword.
    pub fn id_field(mut self, field: FieldDescriptor) -> Self {
        self.id_field_name = Some(field.name.clone());
        let mut field = field.keyword().stored();
        field.searchable = true;
        self.fields.push(field);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<EntitySearchDescriptor> {
        let invalid = |reason: String| SearchError::InvalidDescriptor {
            entity: self.entity_type.clone(),
            reason,
        };

        let name = self.index_name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(invalid(format!("bad index name `{}`", self.index_name)));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(invalid("field with empty name".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
            if let Some(ac) = field.autocomplete
                && (ac.min_gram == 0 || ac.min_gram > ac.max_gram)
            {
                return Err(invalid(format!(
                    "field `{}` has an empty autocomplete gram range",
                    field.name
                )));
            }
        }

        let id_field_name = self
            .id_field_name
            .clone()
            .ok_or_else(|| invalid("no id field declared".into()))?;
        let id_index = self
            .fields
            .iter()
            .position(|f| f.name == id_field_name)
            .ok_or_else(|| invalid(format!("id field `{id_field_name}` missing")))?;
        let id_field = &self.fields[id_index];
        if !id_field.store {
            return Err(invalid(format!("id field `{id_field_name}` must be stored")));
        }
        if id_field.is_numeric() {
            return Err(invalid(format!(
                "id field `{id_field_name}` cannot be numeric"
            )));
        }
        if id_field.lower_case_keyword {
            return Err(invalid(format!(
                "id field `{id_field_name}` cannot be case-folded"
            )));
        }

        Ok(EntitySearchDescriptor {
            entity_type: self.entity_type,
            index_name: self.index_name,
            id_field_name,
            id_index,
            fields: self.fields,
        })
    }
}
