//! Error taxonomy for the search layer.

use thiserror::Error;

/// Errors surfaced by schema lookup, predicate compilation, indexing and search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("entity `{0}` is not registered for search")]
    EntityNotRegistered(String),

    #[error("field `{field}` is not part of the `{entity}` search descriptor")]
    UnknownField { entity: String, field: String },

    #[error("field `{field}` of `{entity}` is store-only and cannot be queried")]
    FieldNotIndexed { entity: String, field: String },

    #[error("invalid search descriptor for `{entity}`: {reason}")]
    InvalidDescriptor { entity: String, reason: String },

    #[error("no sync handler registered for `{0}`")]
    NoSyncHandler(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The predicate has a shape the compiler has no lowering rule for.
    #[error("unsupported predicate: {0}")]
    Unsupported(String),

    #[error("invalid operand for field `{field}`: {reason}")]
    InvalidOperand { field: String, reason: String },

    #[error("document for `{entity}` has no value for id field `{field}`")]
    MissingId { entity: String, field: String },

    #[error("source of record failed: {0:#}")]
    Source(anyhow::Error),

    #[error("filter provider failed: {0:#}")]
    FilterProvider(anyhow::Error),

    #[error("sync cancelled")]
    Cancelled,

    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// True for errors caused by schema or caller configuration rather than
    /// runtime conditions. These are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EntityNotRegistered(_)
                | Self::UnknownField { .. }
                | Self::FieldNotIndexed { .. }
                | Self::InvalidDescriptor { .. }
                | Self::NoSyncHandler(_)
                | Self::Config(_)
        )
    }

    /// True for predicate shapes or operands the compiler cannot lower.
    pub fn is_compiler_limitation(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::InvalidOperand { .. })
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
