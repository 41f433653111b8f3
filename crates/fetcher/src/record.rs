//! Host records and the collection a fetcher fills in place

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::value::identity_key;

/// Untyped row returned by a data source
pub type RawRecord = Map<String, Value>;

/// A mutable bag of named values receiving related data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object; any other value yields an empty record
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Read a field, `None` for unknown fields
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<RawRecord> for Record {
    fn from(fields: RawRecord) -> Self {
        Self { fields }
    }
}

/// Ordered sequence of host records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordCollection {
    records: Vec<Record>,
}

/// One group of records sharing a discriminator value, with the positions
/// they held in the collection they were taken from
#[derive(Debug, Clone)]
pub struct Partition {
    pub key: Value,
    pub positions: Vec<usize>,
    pub records: RecordCollection,
}

impl RecordCollection {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Build a collection from JSON objects
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::new(values.into_iter().map(Record::from_value).collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Record> {
        self.records.iter_mut()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Split the collection into one partition per distinct value of `field`.
    ///
    /// Partitions are ordered by first occurrence. Records missing the field
    /// share the `null` partition. The collection is left empty; use
    /// [`RecordCollection::reassemble`] to restore it.
    pub fn partition_by(&mut self, field: &str) -> Vec<Partition> {
        let mut partitions: Vec<Partition> = Vec::new();
        let mut index_by_key: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();

        for (position, record) in std::mem::take(&mut self.records).into_iter().enumerate() {
            let key = record.get(field).cloned().unwrap_or(Value::Null);
            let slot = *index_by_key.entry(identity_key(&key)).or_insert_with(|| {
                partitions.push(Partition {
                    key: key.clone(),
                    positions: Vec::new(),
                    records: RecordCollection::default(),
                });
                partitions.len() - 1
            });

            let partition = &mut partitions[slot];
            partition.positions.push(position);
            partition.records.push(record);
        }

        partitions
    }

    /// Put partitioned records back at their original positions
    pub fn reassemble(partitions: Vec<Partition>) -> Self {
        let total: usize = partitions.iter().map(|p| p.positions.len()).sum();
        let mut slots: Vec<Option<Record>> = vec![None; total];

        for partition in partitions {
            for (position, record) in partition.positions.into_iter().zip(partition.records.records) {
                if let Some(slot) = slots.get_mut(position) {
                    *slot = Some(record);
                }
            }
        }

        Self::new(slots.into_iter().flatten().collect())
    }
}

impl FromIterator<Record> for RecordCollection {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for RecordCollection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordCollection {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
