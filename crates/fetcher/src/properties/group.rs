use serde_json::Value;

use super::wiring::{ConfigureDispatch, DispatchWiring};
use super::PropertySchemaDispatcher;
use crate::error::FetchResult;
use crate::fetch::Fetcher;
use crate::record::{Partition, RecordCollection};
use crate::source::{SharedSource, SourceRegistry};
use crate::value::is_empty;

/// Runs an independent [`PropertySchemaDispatcher`] per schema group.
///
/// Hosts are partitioned by `group_field`; every partition gets its own
/// value source, resolved from the group id through a memoizing registry,
/// and a dispatcher carrying the shared wiring. Partitions run one after
/// the other; the first failing partition stops the run and its error is
/// returned with the collection restored to its original order. Hosts
/// without a group id are left untouched.
#[derive(Clone)]
pub struct GroupPartitionedDispatcher {
    group_field: String,
    foreign_key: String,
    definition_source: SharedSource,
    sources: SourceRegistry,
    wiring: DispatchWiring,
}

impl GroupPartitionedDispatcher {
    pub fn new(
        group_field: impl Into<String>,
        foreign_key: impl Into<String>,
        definition_source: SharedSource,
    ) -> Self {
        Self {
            group_field: group_field.into(),
            foreign_key: foreign_key.into(),
            definition_source,
            sources: SourceRegistry::new("schema group"),
            wiring: DispatchWiring::default(),
        }
    }

    /// Value source for one group id
    pub fn with_group_source(self, group_id: impl Into<Value>, source: SharedSource) -> Self {
        self.sources.register(group_id, source);
        self
    }

    /// Builds value sources for groups without an explicit one; every
    /// source is built once and reused
    pub fn with_source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Value) -> FetchResult<SharedSource> + Send + Sync + 'static,
    {
        self.sources = self.sources.with_factory(factory);
        self
    }

    pub fn group_field(&self) -> &str {
        &self.group_field
    }

    fn fill_partition(&self, partition: &mut Partition) -> FetchResult<()> {
        let source = self.sources.resolve(&partition.key)?;
        tracing::debug!(
            group_field = %self.group_field,
            group = %partition.key,
            records = partition.records.len(),
            "dispatching schema group"
        );

        PropertySchemaDispatcher::for_schema(
            source,
            partition.key.clone(),
            self.foreign_key.clone(),
            self.group_field.clone(),
            self.definition_source.clone(),
        )
        .with_wiring(self.wiring.clone())
        .fill(&mut partition.records)
    }
}

impl ConfigureDispatch for GroupPartitionedDispatcher {
    fn wiring_mut(&mut self) -> &mut DispatchWiring {
        &mut self.wiring
    }
}

impl Fetcher for GroupPartitionedDispatcher {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        if collection.is_empty() {
            return Ok(());
        }

        let mut partitions = collection.partition_by(&self.group_field);
        let mut result = Ok(());
        for partition in partitions.iter_mut() {
            if is_empty(&partition.key) {
                tracing::trace!(
                    group_field = %self.group_field,
                    records = partition.records.len(),
                    "records without a schema group left untouched"
                );
                continue;
            }

            result = self.fill_partition(partition);
            if result.is_err() {
                break;
            }
        }

        *collection = RecordCollection::reassemble(partitions);
        result
    }
}

impl std::fmt::Debug for GroupPartitionedDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupPartitionedDispatcher")
            .field("group_field", &self.group_field)
            .field("foreign_key", &self.foreign_key)
            .field("definition_source", &self.definition_source.name())
            .field("sources", &self.sources)
            .field("wiring", &self.wiring)
            .finish()
    }
}
