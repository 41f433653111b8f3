//! Key bindings - how a foreign key is read from host records and how matched
//! linked rows are written back

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::model::{
    Aggregate, AggregateType, Derivative, DerivativeType, LinkedModel, ModelType,
};
use crate::record::{Record, RecordCollection};
use crate::value::{as_list, contains_loose, identity_key, is_empty, loose_eq, unique_non_empty};

pub mod set;

pub use set::KeyBindingSet;

/// Custom key reader
pub type ValueGetter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
/// Custom result writer
pub type ValueSetter = Arc<dyn Fn(&mut Record, Value) + Send + Sync>;
/// Custom match predicate between a host record and a linked row
pub type Comparator = Arc<dyn Fn(&Record, &Value) -> bool + Send + Sync>;

/// Where a binding reads its key from and writes its result to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// A top-level field of the host record
    Direct(String),
    /// An entry of an object stored under `bag`
    Bag { bag: String, key: String },
}

impl FieldPath {
    pub fn direct(field: impl Into<String>) -> Self {
        FieldPath::Direct(field.into())
    }

    pub fn bag(bag: impl Into<String>, key: impl Into<String>) -> Self {
        FieldPath::Bag {
            bag: bag.into(),
            key: key.into(),
        }
    }

    /// Innermost field name
    pub fn key(&self) -> &str {
        match self {
            FieldPath::Direct(field) => field,
            FieldPath::Bag { key, .. } => key,
        }
    }

    pub fn read(&self, record: &Record) -> Option<Value> {
        match self {
            FieldPath::Direct(field) => record.get(field).cloned(),
            FieldPath::Bag { bag, key } => record
                .get(bag)
                .and_then(|value| value.as_object())
                .and_then(|entries| entries.get(key))
                .cloned(),
        }
    }

    /// Write a value, creating the bag object when it is missing
    pub fn write(&self, record: &mut Record, value: Value) {
        match self {
            FieldPath::Direct(field) => record.set(field.clone(), value),
            FieldPath::Bag { bag, key } => {
                if !record.get(bag).is_some_and(Value::is_object) {
                    record.set(bag.clone(), Value::Object(serde_json::Map::new()));
                }
                if let Some(Value::Object(entries)) = record.get_mut(bag) {
                    entries.insert(key.clone(), value);
                }
            }
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Direct(field) => f.write_str(field),
            FieldPath::Bag { bag, key } => write!(f, "{}.{}", bag, key),
        }
    }
}

/// One foreign-key relation and how its result is attached
#[derive(Clone)]
pub struct KeyBinding {
    source: FieldPath,
    dest: FieldPath,
    multiple: bool,
    getter: Option<ValueGetter>,
    setter: Option<ValueSetter>,
    comparator: Option<Comparator>,
    cast: Option<ModelType>,
    derivative: Option<DerivativeType>,
    aggregate: Option<AggregateType>,
}

impl KeyBinding {
    /// Create a new binding reading the key from `source_key` and writing
    /// the match to `dest_key`
    pub fn new(source_key: impl Into<String>, dest_key: impl Into<String>) -> Self {
        Self::with_paths(FieldPath::direct(source_key), FieldPath::direct(dest_key))
    }

    /// Create a new binding reading the key from `bag.key` and overwriting
    /// it with the match
    ///
    /// ```
    /// use elif_fetcher::{KeyBinding, RecordCollection};
    /// use serde_json::json;
    ///
    /// let binding = KeyBinding::in_bag("PROPERTIES", "AUTHOR_VALUE").multiple(true);
    /// let hosts = RecordCollection::from_values(vec![json!({"PROPERTIES": {"AUTHOR_VALUE": ["1", "2"]}})]);
    ///
    /// assert!(binding.is_multiple());
    /// assert_eq!(binding.extract_values(&hosts), vec![json!("1"), json!("2")]);
    /// ```
    pub fn in_bag(bag: impl Into<String>, key: impl Into<String>) -> Self {
        let path = FieldPath::bag(bag, key);
        Self::with_paths(path.clone(), path)
    }

    /// Create a new binding between two explicit field paths
    pub fn with_paths(source: FieldPath, dest: FieldPath) -> Self {
        Self {
            source,
            dest,
            multiple: false,
            getter: None,
            setter: None,
            comparator: None,
            cast: None,
            derivative: None,
            aggregate: None,
        }
    }

    /// Set whether matches are attached as a list
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    /// Set a custom key reader, replacing the source path
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Set a custom result writer, replacing the destination path
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut Record, Value) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Set a custom match predicate instead of loose key equality
    pub fn with_comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&Record, &Value) -> bool + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub(crate) fn set_comparator(&mut self, comparator: Comparator) {
        self.comparator = Some(comparator);
    }

    /// Cast every matched row into `M` before attaching it
    pub fn cast_to<M: LinkedModel>(self) -> Self {
        self.with_model_type(ModelType::of::<M>())
    }

    /// Set the model matched rows are cast into
    pub fn with_model_type(mut self, model: ModelType) -> Self {
        self.cast = Some(model);
        self
    }

    /// Cast into `D::Base` and wrap every cast row in `D`
    pub fn cast_as_derivative<D: Derivative>(self) -> Self {
        let mut binding = self.cast_to::<D::Base>();
        binding.derivative = Some(DerivativeType::of::<D>());
        binding
    }

    /// Cast into `A::Item` and fold all matches into one `A`; forces `multiple`
    pub fn cast_as_aggregate<A: Aggregate>(self) -> Self {
        let mut binding = self.cast_to::<A::Item>().multiple(true);
        binding.aggregate = Some(AggregateType::of::<A>());
        binding
    }

    /// Wrap matches in a derivative of the model this binding already casts to
    pub fn load_as(mut self, derivative: DerivativeType) -> FetchResult<Self> {
        let cast = self.require_cast(derivative.name())?;
        if !derivative.accepts(cast) {
            return Err(FetchError::configuration(format!(
                "{} is not built over {}",
                derivative.name(),
                cast.name()
            )));
        }

        self.derivative = Some(derivative);
        Ok(self)
    }

    /// Fold matches into an aggregate of the model this binding already casts to
    pub fn aggregate_as(mut self, aggregate: AggregateType) -> FetchResult<Self> {
        let cast = self.require_cast(aggregate.name())?;
        if !aggregate.accepts(cast) {
            return Err(FetchError::configuration(format!(
                "{} does not aggregate {}",
                aggregate.name(),
                cast.name()
            )));
        }

        self.aggregate = Some(aggregate);
        self.multiple = true;
        Ok(self)
    }

    /// Copy of this binding attaching rows as they are
    pub fn without_cast(&self) -> Self {
        let mut binding = self.clone();
        binding.cast = None;
        binding.derivative = None;
        binding.aggregate = None;
        binding
    }

    pub fn source(&self) -> &FieldPath {
        &self.source
    }

    pub fn dest(&self) -> &FieldPath {
        &self.dest
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn has_comparator(&self) -> bool {
        self.comparator.is_some()
    }

    pub fn model_type(&self) -> Option<&ModelType> {
        self.cast.as_ref()
    }

    /// Host-side key of one record
    pub fn key_of(&self, record: &Record) -> Value {
        match &self.getter {
            Some(getter) => getter(record),
            None => self.source.read(record).unwrap_or(Value::Null),
        }
    }

    /// Distinct non-empty keys over the collection; list keys are flattened
    pub fn extract_values(&self, collection: &RecordCollection) -> Vec<Value> {
        let mut values = Vec::new();
        for record in collection {
            let key = self.key_of(record);
            if is_empty(&key) {
                continue;
            }

            match key {
                Value::Array(items) => values.extend(items),
                scalar => values.push(scalar),
            }
        }

        unique_non_empty(values)
    }

    /// Attach matching rows from `linked` to every record of the collection.
    ///
    /// `linked_key` names the field on linked rows compared with host keys.
    pub fn attach(
        &self,
        collection: &mut RecordCollection,
        linked: &[Value],
        linked_key: &str,
    ) -> FetchResult<()> {
        for record in collection.iter_mut() {
            if self.multiple {
                self.attach_multiple(record, linked, linked_key)?;
            } else {
                self.attach_single(record, linked, linked_key)?;
            }
        }

        Ok(())
    }

    fn attach_single(&self, record: &mut Record, linked: &[Value], linked_key: &str) -> FetchResult<()> {
        let host_key = self.key_of(record);
        if self.comparator.is_none() && is_empty(&host_key) {
            return Ok(());
        }

        let matched = linked
            .iter()
            .find(|item| self.matches(record, &host_key, item, linked_key));

        if let Some(item) = matched {
            let value = self.project(item.clone())?;
            self.write(record, value);
        }

        Ok(())
    }

    fn attach_multiple(&self, record: &mut Record, linked: &[Value], linked_key: &str) -> FetchResult<()> {
        let host_key = self.key_of(record);
        if self.comparator.is_none() && is_empty(&host_key) {
            return Ok(());
        }

        let mut seen = std::collections::HashSet::new();
        let mut items = Vec::new();
        for item in linked {
            if self.matches(record, &host_key, item, linked_key) && seen.insert(identity_key(item)) {
                items.push(self.project(item.clone())?);
            }
        }

        let value = match &self.aggregate {
            Some(aggregate) => aggregate.build(items)?,
            None => Value::Array(items),
        };
        self.write(record, value);

        Ok(())
    }

    fn matches(&self, record: &Record, host_key: &Value, item: &Value, linked_key: &str) -> bool {
        if let Some(comparator) = &self.comparator {
            return comparator(record, item);
        }

        let linked_value = item.get(linked_key).unwrap_or(&Value::Null);
        if is_empty(linked_value) {
            return false;
        }

        match host_key {
            Value::Array(_) | Value::Object(_) => contains_loose(&as_list(host_key), linked_value),
            scalar => loose_eq(linked_value, scalar),
        }
    }

    fn project(&self, item: Value) -> FetchResult<Value> {
        let Some(cast) = &self.cast else {
            return Ok(item);
        };

        let value = cast.cast(item)?;
        match &self.derivative {
            Some(derivative) => derivative.wrap(value),
            None => Ok(value),
        }
    }

    fn write(&self, record: &mut Record, value: Value) {
        match &self.setter {
            Some(setter) => setter(record, value),
            None => self.dest.write(record, value),
        }
    }

    fn require_cast(&self, wrapper: &str) -> FetchResult<&ModelType> {
        self.cast.as_ref().ok_or_else(|| {
            FetchError::configuration(format!(
                "{} requires a model type on binding {}",
                wrapper, self.source
            ))
        })
    }
}

impl fmt::Debug for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBinding")
            .field("source", &self.source)
            .field("dest", &self.dest)
            .field("multiple", &self.multiple)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("comparator", &self.comparator.is_some())
            .field("cast", &self.cast)
            .field("derivative", &self.derivative)
            .field("aggregate", &self.aggregate)
            .finish()
    }
}
