//! # elif-fetcher: Batch relation resolver
//!
//! Fills a collection of host records with related records fetched in bulk:
//! keys are collected from every host, one query per relation (or per column
//! chunk) is sent to a [`DataSource`], and the rows are attached back under
//! the configured destination keys.
//!
//! On top of the generic stages sit the property dispatchers, which resolve
//! records of a variable schema: definitions are loaded per schema, value
//! columns are fetched and coalesced, and every relation-typed property is
//! resolved through the resolver of its kind.
//!
//! ```no_run
//! use std::sync::Arc;
//! use elif_fetcher::{FetchStage, Fetcher, InMemorySource, KeyBinding, RecordCollection};
//! use serde_json::json;
//!
//! let tags = Arc::new(InMemorySource::from_values("tags", vec![json!({"ID": 7, "NAME": "rust"})]));
//! let mut posts = RecordCollection::from_values(vec![json!({"ID": 1, "TAG_ID": 7})]);
//!
//! FetchStage::new(tags, KeyBinding::new("TAG_ID", "TAG"), "ID")
//!     .fill(&mut posts)
//!     .unwrap();
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod properties;
pub mod query;
pub mod record;
pub mod source;
pub mod value;

// Re-export the public surface
pub use binding::{FieldPath, KeyBinding, KeyBindingSet};
pub use config::FetchConfig;
pub use error::{FetchError, FetchResult};
pub use fetch::{FetchStage, Fetcher, Modifier, MultiFetchStage};
pub use model::{Aggregate, Derivative, File, LinkedModel, PropertyDefinition, PropertyKind, User};
pub use properties::{
    ConfigureDispatch, DefinitionStage, GroupPartitionedDispatcher, MultiValueNames,
    PropertySchemaDispatcher,
};
pub use query::{Query, QueryOperator};
pub use record::{RawRecord, Record, RecordCollection};
pub use source::{DataSource, InMemorySource, SharedSource, SourceRegistry};
