//! Structured predicates and their compilation to index queries.
//!
//! - **[`expr`]**: the [`Expr`] tree and builder DSL.
//! - **[`compile`](mod@compile)**: lowering of an `Expr` against a descriptor.
//! - **[`node`]**: [`QueryNode`], the engine-neutral primitive set.

pub mod compile;
pub mod expr;
pub mod node;

use std::marker::PhantomData;

pub use compile::compile;
pub use expr::{Expr, captured, field, value};
pub use node::{Occur, QueryNode, TermValue};

use crate::error::Result;
use crate::model::{SchemaRegistry, SearchEntity};

/// A predicate over entity `E`.
///
/// The type parameter only records which entity the expression was written
/// against; compilation resolves fields through `E`'s descriptor.
pub struct Predicate<E> {
    expr: Expr,
    _entity: PhantomData<fn() -> E>,
}

impl<E: SearchEntity> Predicate<E> {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            _entity: PhantomData,
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn compile(&self, registry: &SchemaRegistry) -> Result<QueryNode> {
        let descriptor = registry.get(E::ENTITY_TYPE)?;
        compile(&descriptor, &self.expr)
    }

    /// Erase the entity type so the predicate can travel through a
    /// [`SearchInput`](crate::search::SearchInput) or filter context.
    pub fn into_raw(self) -> RawPredicate {
        RawPredicate {
            entity_type: E::ENTITY_TYPE.to_string(),
            expr: self.expr,
        }
    }
}

impl<E> Clone for Predicate<E> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.expr).finish()
    }
}

/// A predicate tagged with the entity type it was written for.
#[derive(Debug, Clone)]
pub struct RawPredicate {
    pub entity_type: String,
    pub expr: Expr,
}

impl RawPredicate {
    pub fn new(entity_type: impl Into<String>, expr: Expr) -> Self {
        Self {
            entity_type: entity_type.into(),
            expr,
        }
    }
}
