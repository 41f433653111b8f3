//! Column-chunked fetching
//!
//! Sources backed by wide tables cap the number of columns one query may
//! select. A wide selection is split into chunks of at most `max_fields`
//! value columns, each chunk also selecting the join key, and the partial
//! rows are merged back together.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::FetchResult;
use crate::query::Query;
use crate::record::RawRecord;
use crate::source::DataSource;
use crate::value::identity_key;

/// Fetch `fields` plus `key_field` in as many queries as the column limit
/// requires and merge the partial rows.
///
/// An empty field list runs the query once with its own selection.
pub fn fetch_chunked(
    source: &dyn DataSource,
    query: &Query,
    key_field: &str,
    fields: &[String],
    max_fields: usize,
) -> FetchResult<Vec<RawRecord>> {
    let mut value_fields: Vec<&String> = Vec::new();
    for field in fields {
        if field != key_field && !value_fields.contains(&field) {
            value_fields.push(field);
        }
    }

    if value_fields.is_empty() {
        let rows = source.get_data(query)?;
        tracing::trace!(source = source.name(), rows = rows.len(), "unchunked fetch");
        return Ok(rows);
    }

    let chunks: Vec<&[&String]> = value_fields.chunks(max_fields.max(1)).collect();
    let mut merged: Vec<RawRecord> = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let mut chunk_query = query.clone();
        chunk_query.set_select(
            std::iter::once(key_field.to_string()).chain(chunk.iter().map(|field| field.to_string())),
        );

        let rows = source.get_data(&chunk_query)?;
        tracing::trace!(
            source = source.name(),
            chunk = index,
            columns = chunk.len(),
            rows = rows.len(),
            "fetched select chunk"
        );

        if index == 0 {
            merged = rows;
        } else {
            merge_rows(&mut merged, rows, key_field);
        }
    }

    tracing::debug!(
        source = source.name(),
        chunks = chunks.len(),
        rows = merged.len(),
        "merged chunked fetch"
    );

    Ok(merged)
}

/// Merge `incoming` rows into `target`.
///
/// Rows pair up by join key and by how many rows with that key came before
/// them, so sources returning one row per value of a multi-valued column
/// still line up chunk to chunk. Paired rows are deep-merged; rows without a
/// partner are appended.
pub fn merge_rows(target: &mut Vec<RawRecord>, incoming: Vec<RawRecord>, key_field: &str) {
    let mut positions: HashMap<(String, usize), usize> = HashMap::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();

    for (position, row) in target.iter().enumerate() {
        let key = row_key(row, key_field);
        let occurrence = occurrences.entry(key.clone()).or_insert(0);
        positions.insert((key, *occurrence), position);
        *occurrence += 1;
    }

    occurrences.clear();
    for row in incoming {
        let key = row_key(&row, key_field);
        let occurrence = occurrences.entry(key.clone()).or_insert(0);
        let slot = positions.get(&(key, *occurrence)).copied();
        *occurrence += 1;

        match slot {
            Some(position) => deep_merge(&mut target[position], row),
            None => target.push(row),
        }
    }
}

/// Recursively merge `incoming` into `target`; values already present win
/// unless both sides are objects
fn deep_merge(target: &mut RawRecord, incoming: RawRecord) {
    for (field, value) in incoming {
        match target.get_mut(&field) {
            None => {
                target.insert(field, value);
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(nested) = value {
                    deep_merge(existing, nested);
                }
            }
            Some(_) => {}
        }
    }
}

fn row_key(row: &RawRecord, key_field: &str) -> String {
    identity_key(row.get(key_field).unwrap_or(&Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use serde_json::{json, Map};

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn wide_source(columns: usize) -> InMemorySource {
        let rows = (1..=2)
            .map(|id| {
                let mut row = Map::new();
                row.insert("ID".to_string(), json!(id));
                for column in 0..columns {
                    row.insert(format!("P{}_VALUE", column), json!(format!("{}-{}", id, column)));
                }
                row
            })
            .collect();
        InMemorySource::new("wide", rows)
    }

    #[test]
    fn test_ninety_fields_take_two_queries() {
        let source = wide_source(90);
        let fields: Vec<String> = (0..90).map(|column| format!("P{}_VALUE", column)).collect();
        let query = Query::new().where_in("ID", vec![1, 2]);

        let rows = fetch_chunked(&source, &query, "ID", &fields, 45).unwrap();

        let queries = source.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].select.len(), 46);
        assert_eq!(queries[0].select[0], "ID");
        assert_eq!(queries[1].select[1], "P45_VALUE");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 91);
        assert_eq!(rows[1].get("P89_VALUE"), Some(&json!("2-89")));
    }

    #[test]
    fn test_small_selection_takes_one_query() {
        let source = wide_source(3);
        let fields = vec!["ID".to_string(), "P0_VALUE".to_string(), "P0_VALUE".to_string()];

        let rows = fetch_chunked(&source, &Query::new(), "ID", &fields, 45).unwrap();

        assert_eq!(source.query_count(), 1);
        assert_eq!(source.queries()[0].select, vec!["ID", "P0_VALUE"]);
        assert_eq!(rows[0], raw(json!({"ID": 1, "P0_VALUE": "1-0"})));
    }

    #[test]
    fn test_empty_selection_keeps_query_select() {
        let source = wide_source(2);
        let query = Query::new().select(["P1_VALUE"]);

        let rows = fetch_chunked(&source, &query, "ID", &[], 45).unwrap();
        assert_eq!(rows[0], raw(json!({"P1_VALUE": "1-1"})));
    }

    #[test]
    fn test_merge_pairs_by_key_and_occurrence() {
        let mut target = vec![
            raw(json!({"ID": 1, "A": "x1"})),
            raw(json!({"ID": 1, "A": "x2"})),
            raw(json!({"ID": 2, "A": "y", "META": {"a": 1}})),
        ];
        let incoming = vec![
            raw(json!({"ID": 2, "B": "y", "META": {"b": 2}})),
            raw(json!({"ID": 1, "B": "z1"})),
            raw(json!({"ID": 1, "B": "z2"})),
            raw(json!({"ID": 1, "B": "z3"})),
        ];

        merge_rows(&mut target, incoming, "ID");

        assert_eq!(
            target,
            vec![
                raw(json!({"ID": 1, "A": "x1", "B": "z1"})),
                raw(json!({"ID": 1, "A": "x2", "B": "z2"})),
                raw(json!({"ID": 2, "A": "y", "B": "y", "META": {"a": 1, "b": 2}})),
                raw(json!({"ID": 1, "B": "z3"})),
            ]
        );
    }

    #[test]
    fn test_merge_keeps_existing_scalars() {
        let mut target = vec![raw(json!({"ID": 1, "A": "first"}))];
        merge_rows(&mut target, vec![raw(json!({"ID": "1", "A": "second"}))], "ID");
        assert_eq!(target, vec![raw(json!({"ID": 1, "A": "first"}))]);
    }
}
