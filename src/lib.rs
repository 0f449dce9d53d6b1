//! Typed search over a tantivy index, kept in step with a source of record.
//!
//! - **[`model`]**: per-entity search descriptors and the [`SchemaRegistry`].
//! - **[`predicate`]**: typed predicates compiled to index queries.
//! - **[`indexer`]**: the write gateway and the synchronizer.
//! - **[`storage`]**: [`RecordSource`] and its SQLite and in-memory sources.
//! - **[`search`]**: text queries, filters, execution and [`SearchService`].

pub mod config;
pub mod error;
pub mod indexer;
pub mod model;
pub mod predicate;
pub mod search;
pub mod storage;

pub use config::{SearchConfig, TextOperator};
pub use error::{Result, SearchError};
pub use indexer::{
    CancelFlag, IndexWriteGateway, SearchDocument, SyncOptions, SyncRegistry, SyncReport,
    Synchronizer,
};
pub use model::{
    EntitySearchDescriptor, FieldDescriptor, NumericKind, Record, SchemaRegistry, SearchEntity,
    Value,
};
pub use predicate::{Expr, Predicate, QueryNode, RawPredicate};
pub use search::{
    FilterProvider, SearchFilterContext, SearchHit, SearchInput, SearchResults, SearchService,
};
pub use storage::{MemorySource, RecordSource, SqliteRecordSource};
