//! Property schema resolution
//!
//! Records of a variable schema keep their property values in a separate
//! source, one column `{CODE}_VALUE` per property. The
//! [`PropertySchemaDispatcher`] loads the schema's definitions, pulls the
//! values of every host in one (column-chunked) fetch, folds them onto the
//! hosts and then resolves every relation-typed property through the
//! resolver of its kind, one batched fetch per kind and lookup table.

use serde_json::Value;

use crate::binding::{KeyBinding, KeyBindingSet};
use crate::error::{FetchError, FetchResult};
use crate::fetch::{fetch_chunked, prepare_rows, Fetcher};
use crate::model::{PropertyDefinition, PropertyKind};
use crate::query::{Query, QueryOperator};
use crate::record::{Record, RecordCollection};
use crate::source::SharedSource;
use crate::value::{as_list, contains_loose, is_empty, loose_eq};

pub mod coalesce;
pub mod definitions;
pub mod group;
pub mod wiring;

pub use coalesce::MultiValueNames;
pub use definitions::{DefinitionStage, DEFAULT_GROUP_FIELD};
pub use group::GroupPartitionedDispatcher;
pub use wiring::{ConfigureDispatch, DispatchWiring, KindResolver, LookupTable};

/// Key column of value rows
pub const VALUE_ROW_KEY: &str = "ID";

/// Resolves the property values of one schema onto a host collection
#[derive(Clone)]
pub struct PropertySchemaDispatcher {
    source: SharedSource,
    prop_names: Vec<String>,
    foreign_key: String,
    query: Option<Query>,
    definitions: Option<DefinitionStage>,
    wiring: DispatchWiring,
}

impl PropertySchemaDispatcher {
    /// Dispatcher reading the `prop_names` columns from `source`, matching
    /// `host[foreign_key]` against the rows' `ID`
    pub fn new<I, S>(source: SharedSource, prop_names: I, foreign_key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            prop_names: prop_names.into_iter().map(Into::into).collect(),
            foreign_key: foreign_key.into(),
            query: None,
            definitions: None,
            wiring: DispatchWiring::default(),
        }
    }

    /// Dispatcher resolving every property of the schema `source` is bound to.
    ///
    /// Fails with a not-found error when the source reports no schema.
    pub fn with_all_properties(
        source: SharedSource,
        foreign_key: impl Into<String>,
        group_field: impl Into<String>,
        definition_source: SharedSource,
    ) -> FetchResult<Self> {
        let schema_id = source
            .schema_id()
            .filter(|schema_id| !is_empty(schema_id))
            .ok_or_else(|| {
                FetchError::not_found(format!("data source {} is not bound to a schema", source.name()))
            })?;

        Ok(Self::for_schema(source, schema_id, foreign_key, group_field, definition_source))
    }

    /// Dispatcher resolving every property of `schema_id`
    pub fn for_schema(
        source: SharedSource,
        schema_id: Value,
        foreign_key: impl Into<String>,
        group_field: impl Into<String>,
        definition_source: SharedSource,
    ) -> Self {
        let definitions = DefinitionStage::new(definition_source)
            .with_group_field(group_field)
            .with_default_schema_id(Some(schema_id));

        let mut dispatcher = Self::new(source, Vec::<String>::new(), foreign_key);
        dispatcher.definitions = Some(definitions);
        dispatcher
    }

    /// Load definitions before the values; properties are then derived from
    /// them when no explicit column list was given
    pub fn use_definitions(mut self, definition_source: SharedSource, group_field: impl Into<String>) -> Self {
        let definitions = DefinitionStage::new(definition_source)
            .with_group_field(group_field)
            .with_default_schema_id(self.source.schema_id());
        self.definitions = Some(definitions);
        self
    }

    /// Base query for the value fetch
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub(crate) fn with_wiring(mut self, wiring: DispatchWiring) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn wiring(&self) -> &DispatchWiring {
        &self.wiring
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    fn load_definitions(&self, collection: &mut RecordCollection) -> FetchResult<Vec<PropertyDefinition>> {
        match &self.definitions {
            Some(stage) => stage
                .clone()
                .with_config(self.wiring.config.clone())
                .fill_and_get(collection),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch the value rows of every host and fold them onto the hosts
    fn fill_values(&self, collection: &mut RecordCollection, prop_names: &[String]) -> FetchResult<()> {
        let keys = KeyBinding::new(&self.foreign_key, &self.foreign_key).extract_values(collection);
        if keys.is_empty() {
            tracing::trace!(foreign_key = %self.foreign_key, "no host keys, value fetch skipped");
            return Ok(());
        }

        let key_count = keys.len();
        let mut query = self.query.clone().unwrap_or_default();
        query.add_criteria(VALUE_ROW_KEY, QueryOperator::In, Value::Array(keys));

        let rows = fetch_chunked(
            self.source.as_ref(),
            &query,
            VALUE_ROW_KEY,
            prop_names,
            self.wiring.config.max_select_fields,
        )?;
        let rows = prepare_rows(rows, self.wiring.modifier.as_ref());

        tracing::debug!(
            source = self.source.name(),
            properties = prop_names.len(),
            keys = key_count,
            rows = rows.len(),
            "fetched property values"
        );

        for record in collection.iter_mut() {
            let matched = rows.iter().filter(|row| self.row_matches(record, row));
            let values = coalesce::coalesce(matched, VALUE_ROW_KEY, &self.wiring.multiple_prop_names);
            if values.is_empty() {
                continue;
            }

            match &self.wiring.fill_key {
                Some(bag) => record.set(bag.clone(), Value::Object(values)),
                None => {
                    for (column, value) in values {
                        record.set(column, value);
                    }
                }
            }
        }

        Ok(())
    }

    fn row_matches(&self, record: &Record, row: &Value) -> bool {
        if let Some(comparator) = &self.wiring.comparator {
            return comparator(record, row);
        }

        let host_key = record.get(&self.foreign_key).unwrap_or(&Value::Null);
        let row_key = row.get(VALUE_ROW_KEY).unwrap_or(&Value::Null);
        if is_empty(host_key) || is_empty(row_key) {
            return false;
        }

        match host_key {
            Value::Array(_) => contains_loose(&as_list(host_key), row_key),
            scalar => loose_eq(scalar, row_key),
        }
    }

    /// Binding reading and overwriting the value column of `definition`
    fn binding_for(&self, definition: &PropertyDefinition) -> KeyBinding {
        let value_key = definition.value_key();
        let multiple = definition.multiple || self.wiring.multiple_prop_names.contains(&value_key);

        let binding = match &self.wiring.fill_key {
            Some(bag) => KeyBinding::in_bag(bag.clone(), value_key),
            None => KeyBinding::new(value_key.clone(), value_key),
        };
        binding.multiple(multiple)
    }

    /// Resolve relation-typed properties, one fetch per kind and lookup table
    fn dispatch_kinds(&self, collection: &mut RecordCollection, definitions: &[PropertyDefinition]) -> FetchResult<()> {
        let mut files = KeyBindingSet::new();
        let mut elements = KeyBindingSet::new();
        let mut users = KeyBindingSet::new();
        let mut enumerations = KeyBindingSet::new();
        let mut sections = KeyBindingSet::new();
        let mut lookup_tables: Vec<(String, KeyBindingSet)> = Vec::new();

        for definition in definitions.iter().filter(|definition| !definition.code.is_empty()) {
            let binding = self.binding_for(definition);
            match definition.kind() {
                PropertyKind::File => files.insert(binding),
                PropertyKind::LinkedElement => elements.insert(binding),
                PropertyKind::User => users.insert(binding),
                PropertyKind::Enumeration => enumerations.insert(binding),
                PropertyKind::Section => sections.insert(binding),
                PropertyKind::LookupTable(table) => {
                    match lookup_tables.iter_mut().find(|(name, _)| *name == table) {
                        Some((_, set)) => set.insert(binding),
                        None => lookup_tables.push((table, KeyBindingSet::single(binding))),
                    }
                }
                PropertyKind::Plain => {}
            }
        }

        let stages = [
            (&self.wiring.files, PropertyKind::File, files),
            (&self.wiring.elements, PropertyKind::LinkedElement, elements),
            (&self.wiring.users, PropertyKind::User, users),
            (&self.wiring.enumerations, PropertyKind::Enumeration, enumerations),
            (&self.wiring.sections, PropertyKind::Section, sections),
        ];

        for (resolver, kind, bindings) in stages {
            if let Some(resolver) = resolver {
                if !bindings.is_empty() {
                    resolver.fill(collection, &kind, bindings)?;
                }
            }
        }

        for configured in &self.wiring.lookup_tables {
            if !lookup_tables.iter().any(|(table, _)| *table == configured.table) {
                tracing::trace!(table = %configured.table, "lookup table not referenced by any property");
            }
        }

        for (table, bindings) in lookup_tables {
            let Some(config) = self.wiring.lookup_table(&table) else {
                tracing::trace!(table = %table, "lookup table not configured, properties left as stored");
                continue;
            };

            let resolver = KindResolver::new(self.wiring.lookup_source(config)?, config.select.iter().cloned());
            resolver.fill(collection, &PropertyKind::LookupTable(table), bindings)?;
        }

        Ok(())
    }
}

impl ConfigureDispatch for PropertySchemaDispatcher {
    fn wiring_mut(&mut self) -> &mut DispatchWiring {
        &mut self.wiring
    }
}

impl Fetcher for PropertySchemaDispatcher {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        if collection.is_empty() {
            return Ok(());
        }

        let definitions = self.load_definitions(collection)?;
        let prop_names: Vec<String> = if self.prop_names.is_empty() {
            definitions
                .iter()
                .filter(|definition| !definition.code.is_empty())
                .map(PropertyDefinition::value_key)
                .collect()
        } else {
            self.prop_names.clone()
        };

        if prop_names.is_empty() {
            tracing::trace!(source = self.source.name(), "no properties to resolve");
            return Ok(());
        }

        self.fill_values(collection, &prop_names)?;

        if !definitions.is_empty() {
            self.dispatch_kinds(collection, &definitions)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for PropertySchemaDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySchemaDispatcher")
            .field("source", &self.source.name())
            .field("prop_names", &self.prop_names)
            .field("foreign_key", &self.foreign_key)
            .field("definitions", &self.definitions)
            .field("wiring", &self.wiring)
            .finish()
    }
}

#[cfg(test)]
mod tests;
