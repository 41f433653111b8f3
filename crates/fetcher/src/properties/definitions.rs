use std::sync::Arc;

use serde_json::Value;

use crate::binding::KeyBinding;
use crate::config::FetchConfig;
use crate::error::{FetchError, FetchResult};
use crate::fetch::{fetch_chunked, prepare_rows, Fetcher, Modifier};
use crate::model::PropertyDefinition;
use crate::query::{Query, QueryOperator};
use crate::record::{RawRecord, RecordCollection};
use crate::source::SharedSource;

/// Host field holding the schema id by default
pub const DEFAULT_GROUP_FIELD: &str = "IBLOCK_ID";

/// Loads the property definitions of the schemas a collection belongs to.
///
/// Schema ids are read from `group_field` on every host; when no host
/// carries one, the default schema id is used. Every loaded definition is
/// attached to every host under the configured definitions key.
#[derive(Clone)]
pub struct DefinitionStage {
    source: SharedSource,
    group_field: String,
    default_schema_id: Option<Value>,
    config: FetchConfig,
    modifier: Option<Modifier>,
}

impl DefinitionStage {
    pub fn new(source: SharedSource) -> Self {
        Self {
            source,
            group_field: DEFAULT_GROUP_FIELD.to_string(),
            default_schema_id: None,
            config: FetchConfig::default(),
            modifier: None,
        }
    }

    pub fn with_group_field(mut self, field: impl Into<String>) -> Self {
        self.group_field = field.into();
        self
    }

    pub fn with_default_schema_id(mut self, schema_id: Option<Value>) -> Self {
        self.default_schema_id = schema_id;
        self
    }

    pub fn with_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn modify_with<F>(mut self, modifier: F) -> Self
    where
        F: Fn(RawRecord) -> RawRecord + Send + Sync + 'static,
    {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    pub fn group_field(&self) -> &str {
        &self.group_field
    }

    /// Attach the definitions to the collection and return them typed
    pub fn fill_and_get(&self, collection: &mut RecordCollection) -> FetchResult<Vec<PropertyDefinition>> {
        let binding = KeyBinding::new(&self.group_field, &self.config.definitions_key)
            .multiple(true)
            .with_comparator(|_, _| true);

        let mut schema_ids = binding.extract_values(collection);
        if schema_ids.is_empty() {
            if let Some(default) = &self.default_schema_id {
                schema_ids.push(default.clone());
            }
        }

        if schema_ids.is_empty() {
            tracing::trace!(group_field = %self.group_field, "no schema ids, definitions skipped");
            return Ok(Vec::new());
        }

        let mut query = Query::new();
        if self.config.active_only {
            query.add_criteria("ACTIVE", QueryOperator::Equal, Value::from("Y"));
        }
        if let Some(order) = &self.config.definition_order {
            query = query.order_by(order);
        }
        let schema_count = schema_ids.len();
        query.add_criteria("IBLOCK_ID", QueryOperator::In, Value::Array(schema_ids));

        let rows = fetch_chunked(
            self.source.as_ref(),
            &query,
            "ID",
            &self.config.definition_select,
            self.config.max_select_fields,
        )?;
        let rows = prepare_rows(rows, self.modifier.as_ref());

        tracing::debug!(
            source = self.source.name(),
            schemas = schema_count,
            definitions = rows.len(),
            "loaded property definitions"
        );

        binding.attach(collection, &rows, "IBLOCK_ID")?;

        rows.into_iter()
            .map(|row| serde_json::from_value::<PropertyDefinition>(row).map_err(FetchError::from))
            .collect()
    }
}

impl Fetcher for DefinitionStage {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        self.fill_and_get(collection).map(|_| ())
    }
}

impl std::fmt::Debug for DefinitionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStage")
            .field("source", &self.source.name())
            .field("group_field", &self.group_field)
            .field("default_schema_id", &self.default_schema_id)
            .field("config", &self.config)
            .finish()
    }
}
