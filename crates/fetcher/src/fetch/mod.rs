//! Fetch stages
//!
//! A stage extracts keys from the host collection, asks its data source for
//! every matching row in one query, optionally maps the rows through a
//! modifier and attaches them back through its bindings.

use std::sync::Arc;

use serde_json::Value;

use crate::error::FetchResult;
use crate::record::{RawRecord, RecordCollection};

pub mod chunked;
pub mod multi;
pub mod single;

pub use chunked::{fetch_chunked, merge_rows};
pub use multi::MultiFetchStage;
pub use single::FetchStage;

/// Maps every fetched row before it is attached
pub type Modifier = Arc<dyn Fn(RawRecord) -> RawRecord + Send + Sync>;

/// Anything that can fill a host collection in place
pub trait Fetcher {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()>;
}

impl<T: Fetcher + ?Sized> Fetcher for Box<T> {
    fn fill(&self, collection: &mut RecordCollection) -> FetchResult<()> {
        (**self).fill(collection)
    }
}

/// Run rows through the modifier, if any, and turn them into JSON values
pub(crate) fn prepare_rows(rows: Vec<RawRecord>, modifier: Option<&Modifier>) -> Vec<Value> {
    rows.into_iter()
        .map(|row| match modifier {
            Some(modify) => modify(row),
            None => row,
        })
        .map(Value::Object)
        .collect()
}
