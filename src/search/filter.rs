//! Pluggable structural filters applied after the text query.

use std::sync::Arc;

use async_trait::async_trait;

use super::query::SearchInput;
use crate::model::EntitySearchDescriptor;
use crate::predicate::{QueryNode, RawPredicate};

/// What a filter provider sees for one search call on one entity.
#[derive(Debug, Clone)]
pub struct SearchFilterContext {
    pub entity_type: String,
    pub descriptor: Arc<EntitySearchDescriptor>,
    pub input: SearchInput,
    /// A predicate still waiting to be compiled. Starts as the caller's
    /// predicate; providers may replace it instead of returning a fragment.
    pub predicate: Option<RawPredicate>,
}

/// Contributes a query fragment that is AND-ed onto every search.
///
/// Returning `Ok(None)` contributes nothing, unless the provider left a
/// predicate on the context, which is then compiled against the descriptor.
#[async_trait]
pub trait FilterProvider: Send + Sync {
    async fn filter(&self, ctx: &mut SearchFilterContext) -> anyhow::Result<Option<QueryNode>>;
}

/// Provider backed by a plain function, for filters that need no I/O.
pub struct FnFilter<F>(pub F);

impl<F> FnFilter<F>
where
    F: Fn(&mut SearchFilterContext) -> anyhow::Result<Option<QueryNode>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> FilterProvider for FnFilter<F>
where
    F: Fn(&mut SearchFilterContext) -> anyhow::Result<Option<QueryNode>> + Send + Sync,
{
    async fn filter(&self, ctx: &mut SearchFilterContext) -> anyhow::Result<Option<QueryNode>> {
        (self.0)(ctx)
    }
}
