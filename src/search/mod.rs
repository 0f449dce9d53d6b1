//! Search layer facade.
//!
//! - **[`text`]**: free-text query synthesis (literal, prefix, fuzzy, autocomplete).
//! - **[`filter`]**: [`FilterProvider`] hooks that add structural filters.
//! - **[`query`]**: search input/output types and execution with pagination.
//! - **[`tantivy`]**: schema derivation, directory layout and index opening.
//!
//! [`SearchService`] ties these together with the write gateway and the sync
//! handlers into the public call surface.

pub mod filter;
pub mod query;
pub mod tantivy;
pub mod text;

use std::sync::Arc;
use std::time::Instant;

use ::tantivy::query::{BooleanQuery, Occur, Query};

pub use filter::{FilterProvider, FnFilter, SearchFilterContext};
pub use query::{DEFAULT_MAX_RESULT_COUNT, SearchHit, SearchInput, SearchResults};

use self::tantivy::TantivyIndex;
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::indexer::{
    CancelFlag, IndexWriteGateway, SyncOptions, SyncRegistry, SyncReport, Synchronizer,
};
use crate::model::{EntitySearchDescriptor, SchemaRegistry};
use crate::predicate::{RawPredicate, compile};

/// Entry point for searching, rebuilding and syncing registered entities.
#[derive(Clone)]
pub struct SearchService {
    config: SearchConfig,
    schema: Arc<SchemaRegistry>,
    gateway: IndexWriteGateway,
    providers: Vec<Arc<dyn FilterProvider>>,
    handlers: SyncRegistry,
}

impl SearchService {
    pub fn new(config: SearchConfig, schema: Arc<SchemaRegistry>) -> Self {
        let gateway = IndexWriteGateway::new(&config);
        Self {
            config,
            schema,
            gateway,
            providers: Vec::new(),
            handlers: SyncRegistry::new(),
        }
    }

    /// Append a filter provider. Providers run in registration order.
    pub fn with_filter_provider(mut self, provider: impl FilterProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn with_sync_registry(mut self, handlers: SyncRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// The same service, reading and writing `tenant`'s indexes.
    pub fn for_tenant(&self, tenant: impl Into<String>) -> Self {
        Self {
            gateway: self.gateway.for_tenant(tenant),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn gateway(&self) -> &IndexWriteGateway {
        &self.gateway
    }

    pub fn synchronizer(&self) -> Synchronizer {
        Synchronizer::new(self.gateway.clone())
    }

    pub async fn search(&self, entity_type: &str, input: SearchInput) -> Result<SearchResults> {
        let descriptor = self.schema.get(entity_type)?;
        let started = Instant::now();
        tracing::info!(
            entity = entity_type,
            tenant = ?self.gateway.tenant(),
            query = %input.query,
            prefix = input.prefix,
            fuzzy = input.fuzzy,
            skip = input.skip_count,
            take = input.max_result_count,
            "search_start"
        );

        let index = self.gateway.open_index(&descriptor)?;
        let text = text::build_text_query(
            &index,
            &descriptor,
            &self.config,
            &input.query,
            input.prefix,
            input.fuzzy,
        );
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text)];

        let (skip, take) = (input.skip_count, input.max_result_count);
        let predicate = input.predicate.clone();
        let mut ctx = SearchFilterContext {
            entity_type: entity_type.to_string(),
            descriptor: Arc::clone(&descriptor),
            input,
            predicate,
        };
        for provider in &self.providers {
            let fragment = provider
                .filter(&mut ctx)
                .await
                .map_err(SearchError::FilterProvider)?;
            match fragment {
                Some(node) => clauses.push((Occur::Must, node.to_query(&index)?)),
                None => {
                    if let Some(q) = ctx
                        .predicate
                        .take()
                        .and_then(|p| predicate_fallback(&index, &descriptor, &p))
                    {
                        clauses.push((Occur::Must, q));
                    }
                }
            }
        }
        if let Some(q) = ctx
            .predicate
            .take()
            .and_then(|p| predicate_fallback(&index, &descriptor, &p))
        {
            clauses.push((Occur::Must, q));
        }

        let composed = BooleanQuery::new(clauses);
        let results = query::execute(&index, &descriptor, &composed, skip, take)?;
        tracing::info!(
            entity = entity_type,
            total = results.total_count,
            returned = results.items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search_complete"
        );
        Ok(results)
    }

    /// Search each entity independently and concatenate the pages.
    pub async fn search_many(
        &self,
        entity_types: &[&str],
        input: SearchInput,
    ) -> Result<SearchResults> {
        let mut merged = SearchResults::default();
        for entity_type in entity_types {
            merged.merge(self.search(entity_type, input.clone()).await?);
        }
        Ok(merged)
    }

    /// Delete every document of the entity's index. Returns the count before.
    pub fn rebuild_index(&self, entity_type: &str) -> Result<u64> {
        let descriptor = self.schema.get(entity_type)?;
        let previous = self.gateway.document_count(&descriptor)?;
        self.gateway.clear(&descriptor)?;
        tracing::info!(
            entity = entity_type,
            tenant = ?self.gateway.tenant(),
            previous,
            "rebuild_index"
        );
        Ok(previous)
    }

    /// Clear the index, then repopulate it from the registered source.
    /// Returns the document count before clearing.
    pub async fn rebuild_and_sync_all(&self, entity_type: &str, batch_size: usize) -> Result<u64> {
        let descriptor = self.schema.get(entity_type)?;
        let handler = self.handlers.require(entity_type)?;
        let previous = self.rebuild_index(entity_type)?;
        let options = SyncOptions {
            batch_size,
            delete_missing: self.config.delete_missing,
        };
        handler
            .sync(&self.synchronizer(), &descriptor, &options, &CancelFlag::new())
            .await?;
        Ok(previous)
    }

    /// Run the registered handler for one entity type.
    pub async fn sync_entity(
        &self,
        entity_type: &str,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let descriptor = self.schema.get(entity_type)?;
        let handler = self.handlers.require(entity_type)?;
        handler
            .sync(&self.synchronizer(), &descriptor, options, cancel)
            .await
    }

    /// Sync every registered entity that has a handler, under `tenant`.
    pub async fn sync_tenant(
        &self,
        tenant: &str,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<Vec<SyncReport>> {
        self.synchronizer()
            .sync_tenant(tenant, &self.schema, &self.handlers, options, cancel)
            .await
    }

    pub fn get_document_count(&self, entity_type: &str) -> Result<u64> {
        let descriptor = self.schema.get(entity_type)?;
        self.gateway.document_count(&descriptor)
    }

    /// Up to `take` documents, unranked.
    pub fn dump_index(&self, entity_type: &str, take: usize) -> Result<SearchResults> {
        let descriptor = self.schema.get(entity_type)?;
        let index = self.gateway.open_index(&descriptor)?;
        query::dump(&index, &descriptor, take)
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("index_root", &self.config.index_root)
            .field("tenant", &self.gateway.tenant())
            .field("providers", &self.providers.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Compile a leftover predicate. Failures only cost the filter, never the
/// search.
fn predicate_fallback(
    index: &TantivyIndex,
    descriptor: &EntitySearchDescriptor,
    predicate: &RawPredicate,
) -> Option<Box<dyn Query>> {
    if predicate.entity_type != descriptor.entity_type() {
        tracing::warn!(
            entity = descriptor.entity_type(),
            predicate_entity = %predicate.entity_type,
            "predicate written for another entity; ignored"
        );
        return None;
    }
    let lowered = compile(descriptor, &predicate.expr).and_then(|node| node.to_query(index));
    match lowered {
        Ok(q) => Some(q),
        Err(e) => {
            tracing::warn!(
                entity = descriptor.entity_type(),
                error = %e,
                "predicate could not be compiled; ignored"
            );
            None
        }
    }
}
