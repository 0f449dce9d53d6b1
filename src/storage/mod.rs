//! Systems of record the synchronizer reads from.
//!
//! A [`RecordSource`] serves stable-order pages of full records, pages of
//! projection rows, and the full id set. [`MemorySource`] keeps records in a
//! vector; [`sqlite::SqliteRecordSource`] reads a SQLite table.

pub mod sqlite;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::indexer::projection::{ProjectionRow, project};
use crate::model::SearchEntity;

pub use sqlite::SqliteRecordSource;

#[async_trait]
pub trait RecordSource<E: SearchEntity>: Send + Sync {
    /// Records `skip..skip + take` in a stable order.
    async fn fetch_page(&self, skip: usize, take: usize) -> Result<Vec<E>>;

    /// Same window as [`fetch_page`](Self::fetch_page), reduced to `columns`.
    ///
    /// The default reads full records and projects them; sources that can
    /// select columns natively should override it.
    async fn fetch_projection(
        &self,
        columns: &[String],
        skip: usize,
        take: usize,
    ) -> Result<Vec<ProjectionRow>> {
        let records = self.fetch_page(skip, take).await?;
        records
            .iter()
            .map(|r| {
                project(r, columns)
                    .with_context(|| format!("{} columns exceed a projection row", columns.len()))
            })
            .collect()
    }

    /// Every key currently in the source.
    async fn fetch_ids(&self) -> Result<Vec<E::Key>>;
}

/// An in-memory source of record. Clones share the same records.
pub struct MemorySource<E> {
    records: Arc<RwLock<Vec<E>>>,
}

impl<E> Clone for MemorySource<E> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<E: SearchEntity + Clone> MemorySource<E> {
    pub fn new(records: Vec<E>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub fn push(&self, record: E) {
        self.records.write().push(record);
    }

    /// Drop every record for which `keep` returns false.
    pub fn retain(&self, keep: impl FnMut(&E) -> bool) {
        self.records.write().retain(keep);
    }

    pub fn replace(&self, records: Vec<E>) {
        *self.records.write() = records;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl<E: SearchEntity + Clone> RecordSource<E> for MemorySource<E> {
    async fn fetch_page(&self, skip: usize, take: usize) -> Result<Vec<E>> {
        let records = self.records.read();
        Ok(records.iter().skip(skip).take(take).cloned().collect())
    }

    async fn fetch_projection(
        &self,
        columns: &[String],
        skip: usize,
        take: usize,
    ) -> Result<Vec<ProjectionRow>> {
        let records = self.records.read();
        records
            .iter()
            .skip(skip)
            .take(take)
            .map(|r| project(r, columns).context("projection row overflow"))
            .collect()
    }

    async fn fetch_ids(&self) -> Result<Vec<E::Key>> {
        Ok(self.records.read().iter().map(SearchEntity::key).collect())
    }
}
