//! Index write gateway plus the synchronizer that keeps indexes in step with
//! their source of record.
//!
//! Every mutating call opens a writer on the entity's physical index, applies
//! the whole mutation and commits before returning. Readers never observe a
//! partial batch.

pub mod document;
pub mod projection;
pub mod registry;
pub mod sync;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tantivy::collector::DocSetCollector;
use tantivy::query::AllQuery;
use tantivy::schema::Value as _;
use tantivy::{IndexWriter, TantivyDocument};

pub use document::SearchDocument;
pub use projection::{PROJECTION_WIDTH, ProjectionPlan, ProjectionRow, RowView};
pub use registry::{SyncHandler, SyncRegistry};
pub use sync::{CancelFlag, SyncOptions, SyncReport, SyncStrategy, Synchronizer};

use crate::config::SearchConfig;
use crate::error::Result;
use crate::model::EntitySearchDescriptor;
use crate::search::tantivy::{TantivyIndex, index_dir};

#[derive(Debug, Clone)]
pub struct IndexWriteGateway {
    root: PathBuf,
    writer_heap_bytes: usize,
    tenant: Option<String>,
}

impl IndexWriteGateway {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            root: config.index_root.clone(),
            writer_heap_bytes: config.writer_heap_bytes,
            tenant: None,
        }
    }

    /// The same gateway, scoped to `tenant`'s indexes.
    pub fn for_tenant(&self, tenant: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            ..self.clone()
        }
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, descriptor: &EntitySearchDescriptor) -> Result<PathBuf> {
        index_dir(&self.root, descriptor.index_name(), self.tenant.as_deref())
    }

    pub fn open_index(&self, descriptor: &EntitySearchDescriptor) -> Result<TantivyIndex> {
        TantivyIndex::open_or_create(&self.index_path(descriptor)?, descriptor)
    }

    fn writer(&self, index: &TantivyIndex) -> Result<IndexWriter> {
        index.writer(self.writer_heap_bytes)
    }

    /// Replace the document with the same id, or add it.
    pub fn upsert(
        &self,
        descriptor: &EntitySearchDescriptor,
        document: &SearchDocument,
    ) -> Result<()> {
        self.upsert_many(descriptor, std::slice::from_ref(document), false)
            .map(|_| ())
    }

    /// Upsert a batch in one commit. With `replace_all`, every existing
    /// document is deleted inside that same commit first.
    pub fn upsert_many(
        &self,
        descriptor: &EntitySearchDescriptor,
        documents: &[SearchDocument],
        replace_all: bool,
    ) -> Result<usize> {
        if documents.is_empty() && !replace_all {
            return Ok(0);
        }
        let index = self.open_index(descriptor)?;
        let mut prepared = Vec::with_capacity(documents.len());
        for doc in documents {
            prepared.push((doc.id(), doc.to_tantivy(descriptor, &index)?));
        }

        let mut writer = self.writer(&index)?;
        if replace_all {
            writer.delete_all_documents()?;
        }
        for (id, doc) in prepared {
            writer.delete_term(index.id_term(descriptor, id));
            writer.add_document(doc)?;
        }
        writer.commit()?;

        tracing::debug!(
            entity = descriptor.entity_type(),
            tenant = ?self.tenant,
            documents = documents.len(),
            replace_all,
            "upsert_many"
        );
        Ok(documents.len())
    }

    pub fn delete(&self, descriptor: &EntitySearchDescriptor, id: &str) -> Result<()> {
        self.delete_many(descriptor, [id]).map(|_| ())
    }

    /// Delete every document whose id is in `ids`, in one commit.
    pub fn delete_many<I, S>(&self, descriptor: &EntitySearchDescriptor, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let index = self.open_index(descriptor)?;
        let mut writer = self.writer(&index)?;
        let mut requested = 0;
        for id in ids {
            writer.delete_term(index.id_term(descriptor, id.as_ref()));
            requested += 1;
        }
        if requested == 0 {
            return Ok(0);
        }
        writer.commit()?;
        tracing::debug!(
            entity = descriptor.entity_type(),
            tenant = ?self.tenant,
            requested,
            "delete_many"
        );
        Ok(requested)
    }

    /// Remove every document from the entity's index.
    pub fn clear(&self, descriptor: &EntitySearchDescriptor) -> Result<()> {
        let index = self.open_index(descriptor)?;
        let mut writer = self.writer(&index)?;
        writer.delete_all_documents()?;
        writer.commit()?;
        tracing::info!(
            entity = descriptor.entity_type(),
            tenant = ?self.tenant,
            "index_cleared"
        );
        Ok(())
    }

    pub fn document_count(&self, descriptor: &EntitySearchDescriptor) -> Result<u64> {
        let index = self.open_index(descriptor)?;
        Ok(index.reader()?.searcher().num_docs())
    }

    /// Ids of every document currently in the index.
    pub fn all_ids(&self, descriptor: &EntitySearchDescriptor) -> Result<HashSet<String>> {
        let index = self.open_index(descriptor)?;
        let searcher = index.reader()?.searcher();
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;
        let id_field = index.id_field();

        let mut ids = HashSet::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = doc.get_first(id_field).and_then(|v| v.as_str()) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }
}
