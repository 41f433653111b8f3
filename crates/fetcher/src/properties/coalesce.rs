//! Collapsing property rows into one value set per host record
//!
//! Sources holding property values return one row per value of a
//! multi-valued property. The rows of one host are folded column by column:
//! empty values are dropped, duplicates are removed and a column keeps a list
//! only when it is declared multi-valued or carries several distinct values.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::value::{identity_key, is_empty};

/// Names of properties that always keep a list.
///
/// A name matches either a property code (`COLOR`) or its value column
/// (`COLOR_VALUE`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiValueNames {
    names: HashSet<String>,
}

impl MultiValueNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        if self.names.contains(column) {
            return true;
        }

        column
            .strip_suffix("_VALUE")
            .is_some_and(|code| self.names.contains(code))
            || self.names.contains(&format!("{}_VALUE", column))
    }
}

/// Fold the rows matched for one host into a column → value map.
///
/// `skip` names the join column, which is never copied.
pub fn coalesce<'a, I>(rows: I, skip: &str, multi: &MultiValueNames) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut columns: Vec<(String, Vec<Value>, HashSet<String>)> = Vec::new();

    for row in rows {
        let Some(fields) = row.as_object() else {
            continue;
        };

        for (column, value) in fields {
            if column == skip || is_empty(value) {
                continue;
            }

            let index = match columns.iter().position(|(name, _, _)| name == column) {
                Some(index) => index,
                None => {
                    columns.push((column.clone(), Vec::new(), HashSet::new()));
                    columns.len() - 1
                }
            };

            let (_, values, seen) = &mut columns[index];
            if seen.insert(identity_key(value)) {
                values.push(value.clone());
            }
        }
    }

    columns
        .into_iter()
        .map(|(column, mut values, _)| {
            let value = if values.len() == 1 && !multi.contains(&column) {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            (column, value)
        })
        .collect()
}
