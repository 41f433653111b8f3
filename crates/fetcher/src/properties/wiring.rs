//! Resolver wiring shared by the property dispatchers

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::coalesce::MultiValueNames;
use crate::binding::{Comparator, KeyBindingSet};
use crate::config::FetchConfig;
use crate::error::FetchResult;
use crate::fetch::{Fetcher, Modifier, MultiFetchStage};
use crate::model::PropertyKind;
use crate::record::RecordCollection;
use crate::source::{SharedSource, SourceRegistry};

/// Source and column list of one relation kind
#[derive(Clone)]
pub struct KindResolver {
    pub source: SharedSource,
    pub select: Vec<String>,
}

impl KindResolver {
    pub fn new<I, S>(source: SharedSource, select: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            select: select.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve `bindings` through the stage of `kind`, restricted to the
    /// configured columns
    pub(crate) fn fill(
        &self,
        collection: &mut RecordCollection,
        kind: &PropertyKind,
        bindings: KeyBindingSet,
    ) -> FetchResult<()> {
        let Some(stage) = MultiFetchStage::for_kind(kind, Arc::clone(&self.source), bindings) else {
            return Ok(());
        };

        stage.with_select(self.select.iter().cloned()).fill(collection)
    }
}

impl fmt::Debug for KindResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindResolver")
            .field("source", &self.source.name())
            .field("select", &self.select)
            .finish()
    }
}

/// A lookup table the dispatcher may resolve; without an explicit source
/// the table name is resolved through the lookup registry
#[derive(Clone)]
pub struct LookupTable {
    pub table: String,
    pub select: Vec<String>,
    pub source: Option<SharedSource>,
}

impl fmt::Debug for LookupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupTable")
            .field("table", &self.table)
            .field("select", &self.select)
            .field("source", &self.source.as_ref().map(|source| source.name().to_string()))
            .finish()
    }
}

/// Everything about a dispatcher that is independent of its value source
/// and schema, and is therefore copied to every partition of a group
/// dispatch
#[derive(Clone, Default)]
pub struct DispatchWiring {
    pub(crate) config: FetchConfig,
    pub(crate) multiple_prop_names: MultiValueNames,
    pub(crate) fill_key: Option<String>,
    pub(crate) comparator: Option<Comparator>,
    pub(crate) modifier: Option<Modifier>,
    pub(crate) files: Option<KindResolver>,
    pub(crate) elements: Option<KindResolver>,
    pub(crate) users: Option<KindResolver>,
    pub(crate) enumerations: Option<KindResolver>,
    pub(crate) sections: Option<KindResolver>,
    pub(crate) lookup_tables: Vec<LookupTable>,
    pub(crate) lookup_registry: Option<SourceRegistry>,
}

impl DispatchWiring {
    pub(crate) fn set_lookup_table(&mut self, table: LookupTable) {
        match self.lookup_tables.iter_mut().find(|existing| existing.table == table.table) {
            Some(existing) => *existing = table,
            None => self.lookup_tables.push(table),
        }
    }

    pub(crate) fn lookup_table(&self, table: &str) -> Option<&LookupTable> {
        self.lookup_tables.iter().find(|candidate| candidate.table == table)
    }

    /// Source of a configured lookup table: the explicit one, else the registry
    pub(crate) fn lookup_source(&self, table: &LookupTable) -> FetchResult<SharedSource> {
        if let Some(source) = &table.source {
            return Ok(Arc::clone(source));
        }

        match &self.lookup_registry {
            Some(registry) => registry.resolve(&Value::from(table.table.as_str())),
            None => Err(crate::error::FetchError::not_found(format!(
                "no source for lookup table {}",
                table.table
            ))),
        }
    }
}

impl fmt::Debug for DispatchWiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchWiring")
            .field("config", &self.config)
            .field("multiple_prop_names", &self.multiple_prop_names)
            .field("fill_key", &self.fill_key)
            .field("comparator", &self.comparator.is_some())
            .field("modifier", &self.modifier.is_some())
            .field("files", &self.files)
            .field("elements", &self.elements)
            .field("users", &self.users)
            .field("enumerations", &self.enumerations)
            .field("sections", &self.sections)
            .field("lookup_tables", &self.lookup_tables)
            .field("lookup_registry", &self.lookup_registry)
            .finish()
    }
}

/// Builder methods shared by [`PropertySchemaDispatcher`](super::PropertySchemaDispatcher)
/// and [`GroupPartitionedDispatcher`](super::GroupPartitionedDispatcher)
pub trait ConfigureDispatch: Sized {
    fn wiring_mut(&mut self) -> &mut DispatchWiring;

    /// Resolve file properties (`PROPERTY_TYPE = F`) into [`File`](crate::model::File) models
    fn use_files(mut self, source: SharedSource) -> Self {
        self.wiring_mut().files = Some(KindResolver::new(source, Vec::<String>::new()));
        self
    }

    /// Resolve element links (`PROPERTY_TYPE = E`)
    fn use_linked_elements<I, S>(mut self, select: I, source: SharedSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().elements = Some(KindResolver::new(source, select));
        self
    }

    /// Resolve user references (`USER_TYPE` UserID or employee)
    fn use_users<I, S>(mut self, select: I, source: SharedSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().users = Some(KindResolver::new(source, select));
        self
    }

    /// Resolve list properties (`PROPERTY_TYPE = L`) into their enumeration rows
    fn use_enumerations<I, S>(mut self, select: I, source: SharedSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().enumerations = Some(KindResolver::new(source, select));
        self
    }

    /// Resolve section links (`PROPERTY_TYPE = G`)
    fn use_sections<I, S>(mut self, select: I, source: SharedSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().sections = Some(KindResolver::new(source, select));
        self
    }

    /// Resolve directory properties referencing `table`. Configuring the
    /// same table again replaces the earlier entry.
    fn use_lookup_table<I, S>(mut self, table: impl Into<String>, select: I, source: Option<SharedSource>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().set_lookup_table(LookupTable {
            table: table.into(),
            select: select.into_iter().map(Into::into).collect(),
            source,
        });
        self
    }

    /// Registry consulted for lookup tables configured without a source
    fn with_lookup_registry(mut self, registry: SourceRegistry) -> Self {
        self.wiring_mut().lookup_registry = Some(registry);
        self
    }

    /// Properties whose values always stay lists, by code or value column
    fn set_multiple_prop_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wiring_mut().multiple_prop_names = MultiValueNames::new(names);
        self
    }

    /// Store property values in a bag under `key` instead of on the host
    fn set_fill_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.wiring_mut().fill_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Replace the default `host[foreign_key] == row[ID]` match of value rows
    fn compare_with<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&crate::record::Record, &Value) -> bool + Send + Sync + 'static,
    {
        self.wiring_mut().comparator = Some(Arc::new(comparator));
        self
    }

    /// Map every value row before it is coalesced
    fn modify_with<F>(mut self, modifier: F) -> Self
    where
        F: Fn(crate::record::RawRecord) -> crate::record::RawRecord + Send + Sync + 'static,
    {
        self.wiring_mut().modifier = Some(Arc::new(modifier));
        self
    }

    fn with_config(mut self, config: FetchConfig) -> FetchResult<Self> {
        config.validate()?;
        self.wiring_mut().config = config;
        Ok(self)
    }
}
