//! In-memory data source
//!
//! Evaluates queries over a fixed list of rows and keeps a log of every query
//! it answered, which makes batching behaviour observable.

use std::cmp::Ordering;
use std::sync::Mutex;

use serde_json::Value;

use super::DataSource;
use crate::error::{FetchError, FetchResult};
use crate::query::{OrderDirection, Query};
use crate::record::RawRecord;

#[derive(Debug)]
pub struct InMemorySource {
    name: String,
    rows: Vec<RawRecord>,
    schema_id: Option<Value>,
    failure: Option<String>,
    log: Mutex<Vec<Query>>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, rows: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            rows,
            schema_id: None,
            failure: None,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Build a source from JSON objects; non-object values are ignored
    pub fn from_values<I>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let rows = values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self::new(name, rows)
    }

    pub fn with_schema_id(mut self, schema_id: impl Into<Value>) -> Self {
        self.schema_id = Some(schema_id.into());
        self
    }

    /// Make every query fail with a source error
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Queries answered so far, oldest first
    pub fn queries(&self) -> Vec<Query> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn query_count(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }
}

impl DataSource for InMemorySource {
    fn get_data(&self, query: &Query) -> FetchResult<Vec<RawRecord>> {
        if let Ok(mut log) = self.log.lock() {
            log.push(query.clone());
        }

        if let Some(message) = &self.failure {
            return Err(FetchError::source(format!("{}: {}", self.name, message)));
        }

        let mut rows: Vec<&RawRecord> = self.rows.iter().filter(|row| query.matches(row)).collect();

        if let Some((field, direction)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(rows.into_iter().map(|row| query.project(row)).collect())
    }

    fn schema_id(&self) -> Option<Value> {
        self.schema_id.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
