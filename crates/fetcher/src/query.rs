//! Query criteria handed to a data source
//!
//! A query carries filters, a column selection and an optional ordering.
//! Stages build a fresh query (or clone the base query they were given) for
//! every fetch, so a caller-supplied query is never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::RawRecord;
use crate::value::{as_list, contains_loose, loose_eq};

/// Comparison applied by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    /// Equality; a list value means membership
    Equal,
    /// Membership in a list of values
    In,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::In => write!(f, "IN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// A single `field <op> value` filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereCondition {
    pub field: String,
    pub operator: QueryOperator,
    pub value: Value,
}

impl WhereCondition {
    /// Evaluate the condition against a raw record. A list-valued column
    /// matches when any of its elements does.
    pub fn matches(&self, record: &RawRecord) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };

        let candidates = match actual {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        match (self.operator, &self.value) {
            (QueryOperator::Equal, Value::Array(_)) | (QueryOperator::In, _) => {
                let allowed = as_list(&self.value);
                candidates.iter().any(|c| contains_loose(&allowed, c))
            }
            (QueryOperator::Equal, expected) => candidates.iter().any(|c| loose_eq(c, expected)),
        }
    }

    /// Number of values this condition filters on
    pub fn value_count(&self) -> usize {
        match &self.value {
            Value::Array(items) => items.len(),
            _ => 1,
        }
    }
}

impl fmt::Display for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// Filter, select and order specification for one data source call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<WhereCondition>,
    pub select: Vec<String>,
    pub order_by: Option<(String, OrderDirection)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(mut self, field: &str, value: T) -> Self {
        self.add_criteria(field, QueryOperator::Equal, value.into());
        self
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(mut self, field: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.add_criteria(field, QueryOperator::In, Value::Array(values));
        self
    }

    /// Set the selected columns; an empty selection means every column
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_select(fields);
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), OrderDirection::Asc));
        self
    }

    pub fn add_criteria(&mut self, field: &str, operator: QueryOperator, value: Value) {
        self.filters.push(WhereCondition {
            field: field.to_string(),
            operator,
            value,
        });
    }

    pub fn set_select<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
    }

    pub fn has_select(&self) -> bool {
        !self.select.is_empty()
    }

    /// True when a record satisfies every filter
    pub fn matches(&self, record: &RawRecord) -> bool {
        self.filters.iter().all(|condition| condition.matches(record))
    }

    /// Restrict a record to the selected columns
    pub fn project(&self, record: &RawRecord) -> RawRecord {
        if !self.has_select() {
            return record.clone();
        }

        self.select
            .iter()
            .filter_map(|field| record.get(field).map(|value| (field.clone(), value.clone())))
            .collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let select = if self.has_select() {
            self.select.join(", ")
        } else {
            "*".to_string()
        };
        write!(f, "SELECT {}", select)?;

        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
            write!(f, " WHERE {}", filters.join(" AND "))?;
        }

        if let Some((field, direction)) = &self.order_by {
            let direction = match direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            write!(f, " ORDER BY {} {}", field, direction)?;
        }

        Ok(())
    }
}
