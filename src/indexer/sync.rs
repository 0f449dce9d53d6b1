//! Reconciles a source of record with its search index.
//!
//! Records are read in pages and upserted one commit per page. With
//! `delete_missing`, ids present in the index but no longer in the source are
//! deleted afterwards. A cancelled or failed run leaves earlier pages
//! committed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

use super::document::SearchDocument;
use super::projection::ProjectionPlan;
use super::registry::SyncRegistry;
use super::IndexWriteGateway;
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::model::{EntitySearchDescriptor, SchemaRegistry, SearchEntity};
use crate::storage::RecordSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub batch_size: usize,
    pub delete_missing: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            delete_missing: true,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            delete_missing: config.delete_missing,
        }
    }
}

/// Shared cancellation switch, checked once per page.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Id plus the needed columns per row.
    Projection,
    /// Whole records, for descriptors projection rows cannot serve.
    FullRecord,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Projection => write!(f, "projection"),
            Self::FullRecord => write!(f, "full_record"),
        }
    }
}

/// Outcome of one `sync_all` run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity_type: String,
    pub tenant: Option<String>,
    pub strategy: SyncStrategy,
    pub pages: usize,
    /// Documents upserted.
    pub indexed: usize,
    /// Stale documents removed by reconciliation.
    pub deleted: usize,
    pub duration_ms: u64,
}

pub struct Synchronizer {
    gateway: IndexWriteGateway,
}

impl Synchronizer {
    pub fn new(gateway: IndexWriteGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &IndexWriteGateway {
        &self.gateway
    }

    /// Index every record of `source` and, optionally, drop stale documents.
    pub async fn sync_all<E, S>(
        &self,
        descriptor: &EntitySearchDescriptor,
        source: &S,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport>
    where
        E: SearchEntity,
        S: RecordSource<E> + ?Sized,
    {
        let started = Instant::now();
        let plan = ProjectionPlan::for_descriptor(descriptor);
        let strategy = if plan.is_some() {
            SyncStrategy::Projection
        } else {
            SyncStrategy::FullRecord
        };
        let batch_size = options.batch_size.max(1);
        let entity = descriptor.entity_type();

        tracing::info!(
            entity,
            tenant = ?self.gateway.tenant(),
            %strategy,
            batch_size,
            "sync_start"
        );

        let mut skip = 0;
        let mut pages = 0;
        let mut indexed = 0;
        loop {
            if cancel.is_cancelled() {
                tracing::warn!(entity, pages, indexed, "sync cancelled");
                return Err(SearchError::Cancelled);
            }

            let documents = match &plan {
                Some(plan) => {
                    let rows = source
                        .fetch_projection(plan.columns(), skip, batch_size)
                        .await
                        .map_err(SearchError::Source)?;
                    if rows.is_empty() {
                        break;
                    }
                    skip += rows.len();
                    rows.iter()
                        .map(|row| SearchDocument::from_record(descriptor, &plan.view(row)))
                        .collect::<Result<Vec<_>>>()?
                }
                None => {
                    let records = source
                        .fetch_page(skip, batch_size)
                        .await
                        .map_err(SearchError::Source)?;
                    if records.is_empty() {
                        break;
                    }
                    skip += records.len();
                    records
                        .iter()
                        .map(|record| SearchDocument::from_record(descriptor, record))
                        .collect::<Result<Vec<_>>>()?
                }
            };

            indexed += self.gateway.upsert_many(descriptor, &documents, false)?;
            pages += 1;
            tracing::debug!(entity, page = pages, documents = documents.len(), "sync_page");
        }

        let mut deleted = 0;
        if options.delete_missing {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            deleted = self.delete_stale::<E, S>(descriptor, source).await?;
        }

        let report = SyncReport {
            entity_type: entity.to_string(),
            tenant: self.gateway.tenant().map(str::to_string),
            strategy,
            pages,
            indexed,
            deleted,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            entity,
            tenant = ?report.tenant,
            pages,
            indexed,
            deleted,
            duration_ms = report.duration_ms,
            "sync_complete"
        );
        Ok(report)
    }

    async fn delete_stale<E, S>(
        &self,
        descriptor: &EntitySearchDescriptor,
        source: &S,
    ) -> Result<usize>
    where
        E: SearchEntity,
        S: RecordSource<E> + ?Sized,
    {
        let id_field = descriptor.id_field();
        let live: HashSet<String> = source
            .fetch_ids()
            .await
            .map_err(SearchError::Source)?
            .into_iter()
            .map(|key| id_field.normalize(&key.to_string()))
            .collect();

        let stale: Vec<String> = self
            .gateway
            .all_ids(descriptor)?
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        tracing::info!(
            entity = descriptor.entity_type(),
            stale = stale.len(),
            "deleting documents missing from source"
        );
        self.gateway.delete_many(descriptor, &stale)
    }

    /// Sync every registered entity of `tenant` that has a handler.
    pub async fn sync_tenant(
        &self,
        tenant: &str,
        schema: &SchemaRegistry,
        handlers: &SyncRegistry,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<Vec<SyncReport>> {
        let scoped = Synchronizer::new(self.gateway.for_tenant(tenant));
        let mut reports = Vec::new();
        for descriptor in schema.descriptors() {
            let Some(handler) = handlers.get(descriptor.entity_type()) else {
                tracing::debug!(
                    entity = descriptor.entity_type(),
                    tenant,
                    "no sync handler; skipping"
                );
                continue;
            };
            reports.push(handler.sync(&scoped, descriptor, options, cancel).await?);
        }
        Ok(reports)
    }
}
