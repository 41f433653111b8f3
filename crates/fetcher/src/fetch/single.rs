use std::sync::Arc;

use serde_json::Value;

use super::{prepare_rows, Fetcher, Modifier};
use crate::binding::KeyBinding;
use crate::error::FetchResult;
use crate::model::{Aggregate, AggregateType, Derivative, DerivativeType, LinkedModel};
use crate::query::{Query, QueryOperator};
use crate::record::{RawRecord, Record, RecordCollection};
use crate::source::SharedSource;

/// Single-binding fetch stage.
///
/// Reads keys through one [`KeyBinding`], filters the source on
/// `dest_key IN (keys)` and attaches the rows back through the same binding.
#[derive(Clone)]
pub struct FetchStage {
    source: SharedSource,
    binding: KeyBinding,
    dest_key: String,
    query: Option<Query>,
    modifier: Option<Modifier>,
}

impl FetchStage {
    pub fn new(source: SharedSource, binding: KeyBinding, dest_key: impl Into<String>) -> Self {
        Self {
            source,
            binding,
            dest_key: dest_key.into(),
            query: None,
            modifier: None,
        }
    }

    /// Base query; the key filter is added to a copy on every fill
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn cast_to<M: LinkedModel>(mut self) -> Self {
        self.binding = self.binding.cast_to::<M>();
        self
    }

    /// Wrap every match in `D`; the binding must already cast to `D::Base`
    pub fn load_as<D: Derivative>(mut self) -> FetchResult<Self> {
        self.binding = self.binding.load_as(DerivativeType::of::<D>())?;
        Ok(self)
    }

    /// Fold all matches into `A`; the binding must already cast to `A::Item`
    pub fn aggregate_as<A: Aggregate>(mut self) -> FetchResult<Self> {
        self.binding = self.binding.aggregate_as(AggregateType::of::<A>())?;
        Ok(self)
    }

    pub fn compare_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Record, &Value) -> bool + Send + Sync + 'static,
    {
        self.binding.set_comparator(Arc::new(comparator));
        self
    }

    pub fn modify_with<F>(mut self, modifier: F) -> Self
    where
        F: Fn(RawRecord) -> RawRecord + Send + Sync + 'static,
    {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    pub fn binding(&self) -> &KeyBinding {
        &self.binding
    }

    pub fn dest_key(&self) -> &str {
        &self.dest_key
    }
}

impl Fetcher for FetchStage {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        let keys = self.binding.extract_values(collection);
        if keys.is_empty() {
            tracing::trace!(
                source = self.source.name(),
                binding = %self.binding.source(),
                "no keys, fetch skipped"
            );
            return Ok(());
        }

        let key_count = keys.len();
        let mut query = self.query.clone().unwrap_or_default();
        query.add_criteria(&self.dest_key, QueryOperator::In, Value::Array(keys));

        let rows = self.source.get_data(&query)?;
        tracing::debug!(
            source = self.source.name(),
            binding = %self.binding.source(),
            keys = key_count,
            rows = rows.len(),
            "fetched linked rows"
        );

        let linked = prepare_rows(rows, self.modifier.as_ref());
        self.binding.attach(collection, &linked, &self.dest_key)
    }
}

impl std::fmt::Debug for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStage")
            .field("source", &self.source.name())
            .field("binding", &self.binding)
            .field("dest_key", &self.dest_key)
            .field("query", &self.query)
            .field("modifier", &self.modifier.is_some())
            .finish()
    }
}
