//! Data source boundary
//!
//! Stages never talk to storage directly: every fetch goes through a
//! [`DataSource`]. Sources are injected explicitly; the [`SourceRegistry`]
//! covers the cases where a source has to be built from an identifier
//! (a lookup table name, a schema group id) and reused afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::query::Query;
use crate::record::RawRecord;
use crate::value::identity_key;

pub mod memory;

pub use memory::InMemorySource;

/// Executes a query and returns raw rows
pub trait DataSource: Send + Sync {
    fn get_data(&self, query: &Query) -> FetchResult<Vec<RawRecord>>;

    /// Schema this source holds records of, when it is bound to one
    fn schema_id(&self) -> Option<Value> {
        None
    }

    /// Name used in log output
    fn name(&self) -> &str {
        "data_source"
    }
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn get_data(&self, query: &Query) -> FetchResult<Vec<RawRecord>> {
        (**self).get_data(query)
    }

    fn schema_id(&self) -> Option<Value> {
        (**self).schema_id()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

pub type SharedSource = Arc<dyn DataSource>;

/// Builds a source for an identifier
pub type SourceFactory = Arc<dyn Fn(&Value) -> FetchResult<SharedSource> + Send + Sync>;

/// Memoizing map from identifier to source.
///
/// Explicitly registered sources win; otherwise the factory builds one on
/// first use and the instance is reused for every later lookup.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<Mutex<HashMap<String, SharedSource>>>,
    factory: Option<SourceFactory>,
    label: String,
}

impl SourceRegistry {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            sources: Arc::new(Mutex::new(HashMap::new())),
            factory: None,
            label: label.into(),
        }
    }

    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Value) -> FetchResult<SharedSource> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn register(&self, id: impl Into<Value>, source: SharedSource) {
        let id = id.into();
        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(identity_key(&id), source);
        }
    }

    /// Resolve the source for `id`, building and caching it when needed
    pub fn resolve(&self, id: &Value) -> FetchResult<SharedSource> {
        let key = identity_key(id);
        let mut sources = self
            .sources
            .lock()
            .map_err(|_| FetchError::source(format!("{} registry lock poisoned", self.label)))?;

        if let Some(source) = sources.get(&key) {
            return Ok(Arc::clone(source));
        }

        let factory = self.factory.as_ref().ok_or_else(|| {
            FetchError::not_found(format!("no {} source registered for {}", self.label, id))
        })?;

        tracing::debug!(registry = %self.label, id = %id, "building data source");
        let source = factory(id)?;
        sources.insert(key, Arc::clone(&source));
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.sources.lock().map(|sources| sources.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("label", &self.label)
            .field("sources", &self.len())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}
