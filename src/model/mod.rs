//! Schema model: which entity fields take part in search and how.
//!
//! - **[`value`]**: the dynamic [`Value`] exchanged at record and predicate boundaries.
//! - **[`field`]**: [`FieldDescriptor`], the [`Record`] accessor trait and normalization.
//! - **[`descriptor`]**: [`EntitySearchDescriptor`] and its builder.
//! - **[`registry`]**: [`SchemaRegistry`], the startup-built lookup table.

pub mod descriptor;
pub mod field;
pub mod registry;
pub mod value;

use std::fmt::Display;

pub use descriptor::{DescriptorBuilder, EntitySearchDescriptor};
pub use field::{FieldDescriptor, FieldSource, NumericKind, Record};
pub use registry::SchemaRegistry;
pub use value::Value;

/// A typed entity that can be indexed.
///
/// `ENTITY_TYPE` ties the Rust type to its descriptor in the
/// [`SchemaRegistry`]; `Key` is the identity type the source of record hands
/// back during reconciliation.
pub trait SearchEntity: Record + Send + Sync + 'static {
    const ENTITY_TYPE: &'static str;

    type Key: Display + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}
