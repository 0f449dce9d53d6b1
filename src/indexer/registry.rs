//! Typed sync handlers keyed by entity type.
//!
//! Each handler pairs an entity type with the source that feeds it, so a
//! tenant-wide sync can walk the schema registry and dispatch without knowing
//! any concrete entity type.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use super::sync::{CancelFlag, SyncOptions, SyncReport, Synchronizer};
use crate::error::{Result, SearchError};
use crate::model::{EntitySearchDescriptor, SearchEntity};
use crate::storage::RecordSource;

#[async_trait]
pub trait SyncHandler: Send + Sync {
    fn entity_type(&self) -> &'static str;

    async fn sync(
        &self,
        synchronizer: &Synchronizer,
        descriptor: &EntitySearchDescriptor,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport>;
}

struct SourceHandler<E, S> {
    source: S,
    _entity: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, S> SyncHandler for SourceHandler<E, S>
where
    E: SearchEntity,
    S: RecordSource<E> + 'static,
{
    fn entity_type(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    async fn sync(
        &self,
        synchronizer: &Synchronizer,
        descriptor: &EntitySearchDescriptor,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        synchronizer
            .sync_all::<E, S>(descriptor, &self.source, options, cancel)
            .await
    }
}

#[derive(Default, Clone)]
pub struct SyncRegistry {
    handlers: HashMap<&'static str, Arc<dyn SyncHandler>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` as the system of record for `E`, replacing any
    /// previous handler.
    pub fn register<E, S>(mut self, source: S) -> Self
    where
        E: SearchEntity,
        S: RecordSource<E> + 'static,
    {
        self.handlers.insert(
            E::ENTITY_TYPE,
            Arc::new(SourceHandler {
                source,
                _entity: PhantomData::<fn() -> E>,
            }),
        );
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn SyncHandler>> {
        self.handlers.get(entity_type).cloned()
    }

    pub fn require(&self, entity_type: &str) -> Result<Arc<dyn SyncHandler>> {
        self.get(entity_type)
            .ok_or_else(|| SearchError::NoSyncHandler(entity_type.to_string()))
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
