//! Process-wide registry of entity search descriptors.
//!
//! Assembled once at startup and shared behind an `Arc`; nothing mutates it
//! afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::EntitySearchDescriptor;
use crate::error::{Result, SearchError};

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    descriptors: Vec<Arc<EntitySearchDescriptor>>,
    by_entity: HashMap<String, usize>,
    by_index: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder {
            registry: SchemaRegistry::default(),
        }
    }

    /// Descriptor for an entity type, or a configuration error.
    pub fn get(&self, entity_type: &str) -> Result<Arc<EntitySearchDescriptor>> {
        self.by_entity
            .get(entity_type)
            .map(|&i| Arc::clone(&self.descriptors[i]))
            .ok_or_else(|| SearchError::EntityNotRegistered(entity_type.to_string()))
    }

    pub fn by_index_name(&self, index_name: &str) -> Option<Arc<EntitySearchDescriptor>> {
        self.by_index
            .get(index_name)
            .map(|&i| Arc::clone(&self.descriptors[i]))
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<EntitySearchDescriptor>> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[derive(Debug)]
pub struct SchemaRegistryBuilder {
    registry: SchemaRegistry,
}

impl SchemaRegistryBuilder {
    pub fn register(mut self, descriptor: EntitySearchDescriptor) -> Result<Self> {
        let reg = &mut self.registry;
        if reg.by_entity.contains_key(descriptor.entity_type()) {
            return Err(SearchError::Config(format!(
                "entity `{}` registered twice",
                descriptor.entity_type()
            )));
        }
        if let Some(&other) = reg.by_index.get(descriptor.index_name()) {
            return Err(SearchError::Config(format!(
                "index `{}` is already used by `{}`",
                descriptor.index_name(),
                reg.descriptors[other].entity_type()
            )));
        }
        let slot = reg.descriptors.len();
        reg.by_entity
            .insert(descriptor.entity_type().to_string(), slot);
        reg.by_index.insert(descriptor.index_name().to_string(), slot);
        reg.descriptors.push(Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> Arc<SchemaRegistry> {
        Arc::new(self.registry)
    }
}
