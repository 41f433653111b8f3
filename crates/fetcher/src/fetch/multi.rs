use std::any::type_name;
use std::sync::Arc;

use serde_json::Value;

use super::{prepare_rows, Fetcher, Modifier};
use crate::binding::KeyBindingSet;
use crate::error::{FetchError, FetchResult};
use crate::model::{Aggregate, Derivative, File, LinkedModel, ModelType, PropertyKind, User};
use crate::query::{Query, QueryOperator};
use crate::record::{RawRecord, Record, RecordCollection};
use crate::source::SharedSource;
use crate::value::{int_value, to_int, unique_non_empty};

/// Key column of lookup-table rows
pub const LOOKUP_KEY: &str = "UF_XML_ID";

/// Multi-binding fetch stage.
///
/// Every binding of the set contributes keys to one query and every binding
/// is attached from the same rows. Multi-key stages only perform plain
/// joins: casting wrappers and custom comparators are rejected.
#[derive(Clone)]
pub struct MultiFetchStage {
    label: &'static str,
    source: SharedSource,
    bindings: KeyBindingSet,
    linked_key: String,
    integer_keys: bool,
    model: Option<ModelType>,
    query: Option<Query>,
    modifier: Option<Modifier>,
}

impl MultiFetchStage {
    pub fn new(source: SharedSource, bindings: KeyBindingSet, linked_key: impl Into<String>) -> Self {
        Self {
            label: "multi",
            source,
            bindings,
            linked_key: linked_key.into(),
            integer_keys: false,
            model: None,
            query: None,
            modifier: None,
        }
    }

    /// File rows keyed by integer `ID`, attached as [`File`]
    pub fn files(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::File, source, bindings, "ID").typed_as::<File>()
    }

    /// User rows keyed by integer `ID`, attached as [`User`]
    pub fn users(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::User, source, bindings, "ID").typed_as::<User>()
    }

    pub fn enumerations(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::Enumeration, source, bindings, "ID")
    }

    pub fn sections(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::Section, source, bindings, "ID")
    }

    pub fn linked_elements(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::LinkedElement, source, bindings, "ID")
    }

    /// Lookup-table rows keyed by [`LOOKUP_KEY`], keys used verbatim
    pub fn lookup_table(source: SharedSource, bindings: KeyBindingSet) -> Self {
        Self::of_kind(&PropertyKind::LookupTable(String::new()), source, bindings, LOOKUP_KEY)
    }

    /// Stage resolving properties of `kind`; plain properties have none
    pub fn for_kind(kind: &PropertyKind, source: SharedSource, bindings: KeyBindingSet) -> Option<Self> {
        match kind {
            PropertyKind::File => Some(Self::files(source, bindings)),
            PropertyKind::LinkedElement => Some(Self::linked_elements(source, bindings)),
            PropertyKind::User => Some(Self::users(source, bindings)),
            PropertyKind::Enumeration => Some(Self::enumerations(source, bindings)),
            PropertyKind::Section => Some(Self::sections(source, bindings)),
            PropertyKind::LookupTable(_) => Some(Self::lookup_table(source, bindings)),
            PropertyKind::Plain => None,
        }
    }

    fn of_kind(kind: &PropertyKind, source: SharedSource, bindings: KeyBindingSet, linked_key: &str) -> Self {
        Self::new(source, bindings, linked_key)
            .labeled(kind.label())
            .integer_keys(kind.uses_integer_keys())
    }

    fn labeled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Cast extracted keys to integers before querying; keys that do not
    /// denote an integer are dropped
    pub fn integer_keys(mut self, integer_keys: bool) -> Self {
        self.integer_keys = integer_keys;
        self
    }

    /// Cast the fetched rows into `M` once before attaching them
    pub fn typed_as<M: LinkedModel>(mut self) -> Self {
        self.model = Some(ModelType::of::<M>());
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Restrict the selected columns; an empty list selects everything
    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut query = self.query.take().unwrap_or_default();
        query.set_select(fields);
        self.query = Some(query);
        self
    }

    pub fn modify_with<F>(mut self, modifier: F) -> Self
    where
        F: Fn(RawRecord) -> RawRecord + Send + Sync + 'static,
    {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    pub fn cast_to<M: LinkedModel>(self) -> FetchResult<Self> {
        Err(self.unsupported(&format!("cast_to::<{}>", M::model_name())))
    }

    pub fn load_as<D: Derivative>(self) -> FetchResult<Self> {
        Err(self.unsupported(&format!("load_as::<{}>", type_name::<D>())))
    }

    pub fn aggregate_as<A: Aggregate>(self) -> FetchResult<Self> {
        Err(self.unsupported(&format!("aggregate_as::<{}>", type_name::<A>())))
    }

    pub fn compare_with<F>(self, _comparator: F) -> FetchResult<Self>
    where
        F: Fn(&Record, &Value) -> bool + Send + Sync + 'static,
    {
        Err(self.unsupported("compare_with"))
    }

    pub fn bindings(&self) -> &KeyBindingSet {
        &self.bindings
    }

    pub fn linked_key(&self) -> &str {
        &self.linked_key
    }

    fn unsupported(&self, operation: &str) -> FetchError {
        FetchError::configuration(format!(
            "{} is not supported by the {} multi-key stage",
            operation, self.label
        ))
    }

    fn keys(&self, collection: &RecordCollection) -> Vec<Value> {
        let keys = self.bindings.extract_values(collection);
        if !self.integer_keys {
            return keys;
        }

        unique_non_empty(keys.iter().filter_map(to_int).map(int_value))
    }
}

impl Fetcher for MultiFetchStage {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        if self.bindings.is_empty() {
            return Ok(());
        }

        let keys = self.keys(collection);
        if keys.is_empty() {
            tracing::trace!(stage = self.label, source = self.source.name(), "no keys, fetch skipped");
            return Ok(());
        }

        let key_count = keys.len();
        let mut query = self.query.clone().unwrap_or_default();
        query.add_criteria(&self.linked_key, QueryOperator::In, Value::Array(keys));

        let rows = self.source.get_data(&query)?;
        tracing::debug!(
            stage = self.label,
            source = self.source.name(),
            bindings = self.bindings.len(),
            keys = key_count,
            rows = rows.len(),
            "fetched linked rows"
        );

        let linked = prepare_rows(rows, self.modifier.as_ref());
        match &self.model {
            Some(model) => self
                .bindings
                .attach_as_typed(collection, &linked, &self.linked_key, model),
            None => self.bindings.attach(collection, &linked, &self.linked_key),
        }
    }
}

impl std::fmt::Debug for MultiFetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFetchStage")
            .field("label", &self.label)
            .field("source", &self.source.name())
            .field("bindings", &self.bindings)
            .field("linked_key", &self.linked_key)
            .field("integer_keys", &self.integer_keys)
            .field("model", &self.model)
            .field("query", &self.query)
            .finish()
    }
}
