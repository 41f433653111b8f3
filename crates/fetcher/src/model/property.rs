//! Property definitions of a variable record schema

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::serde_util;
use super::LinkedModel;

/// `PROPERTY_TYPE` codes
pub mod property_type {
    pub const STRING: &str = "S";
    pub const NUMBER: &str = "N";
    pub const LIST: &str = "L";
    pub const FILE: &str = "F";
    pub const ELEMENT: &str = "E";
    pub const SECTION: &str = "G";
}

/// `USER_TYPE` codes the resolver cares about
pub mod user_type {
    pub const USER_ID: &str = "UserID";
    pub const EMPLOYEE: &str = "employee";
    pub const DIRECTORY: &str = "directory";
}

/// Relation kind a property resolves through
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    File,
    LinkedElement,
    User,
    Enumeration,
    Section,
    /// External lookup table, keyed by the referenced table name
    LookupTable(String),
    /// No resolver; the value stays as stored
    Plain,
}

impl PropertyKind {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyKind::File => "file",
            PropertyKind::LinkedElement => "element",
            PropertyKind::User => "user",
            PropertyKind::Enumeration => "enum",
            PropertyKind::Section => "section",
            PropertyKind::LookupTable(_) => "lookup_table",
            PropertyKind::Plain => "plain",
        }
    }

    /// Whether extracted keys are normalized to integers before querying
    pub fn uses_integer_keys(&self) -> bool {
        matches!(
            self,
            PropertyKind::File | PropertyKind::User | PropertyKind::Enumeration | PropertyKind::Section
        )
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::LookupTable(table) => write!(f, "lookup_table({})", table),
            other => f.write_str(other.label()),
        }
    }
}

/// One property of a schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct PropertyDefinition {
    #[serde(deserialize_with = "serde_util::int")]
    pub id: i64,
    #[serde(rename = "IBLOCK_ID", deserialize_with = "serde_util::opt_int")]
    pub schema_id: Option<i64>,
    #[serde(deserialize_with = "serde_util::string")]
    pub code: String,
    #[serde(deserialize_with = "serde_util::string")]
    pub name: String,
    #[serde(deserialize_with = "serde_util::string")]
    pub property_type: String,
    #[serde(rename = "LINK_IBLOCK_ID", deserialize_with = "serde_util::opt_int")]
    pub link_schema_id: Option<i64>,
    #[serde(with = "serde_util::yes_no_flag")]
    pub multiple: bool,
    #[serde(deserialize_with = "serde_util::string")]
    pub user_type: String,
    #[serde(deserialize_with = "serde_util::int")]
    pub sort: i64,
    pub user_type_settings: Value,
}

impl PropertyDefinition {
    pub fn new(code: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            property_type: property_type.into(),
            ..Self::default()
        }
    }

    pub fn with_user_type(mut self, user_type: impl Into<String>) -> Self {
        self.user_type = user_type.into();
        self
    }

    pub fn with_multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.user_type_settings = settings;
        self
    }

    /// Field holding this property's value on primary rows and host records
    pub fn value_key(&self) -> String {
        format!("{}_VALUE", self.code)
    }

    /// Settings as an object; a JSON-encoded string is decoded first
    pub fn settings(&self) -> serde_json::Map<String, Value> {
        match &self.user_type_settings {
            Value::Object(map) => map.clone(),
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            },
            _ => serde_json::Map::new(),
        }
    }

    /// Table referenced by a directory property, when one is configured
    pub fn lookup_table_name(&self) -> Option<String> {
        match self.settings().get("TABLE_NAME") {
            Some(Value::String(table)) if !table.is_empty() => Some(table.clone()),
            _ => None,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match (self.property_type.as_str(), self.user_type.as_str()) {
            (property_type::FILE, _) => PropertyKind::File,
            (property_type::ELEMENT, _) => PropertyKind::LinkedElement,
            (_, user_type::USER_ID | user_type::EMPLOYEE) => PropertyKind::User,
            (property_type::LIST, _) => PropertyKind::Enumeration,
            (property_type::SECTION, _) => PropertyKind::Section,
            (_, user_type::DIRECTORY) => match self.lookup_table_name() {
                Some(table) => PropertyKind::LookupTable(table),
                None => PropertyKind::Plain,
            },
            _ => PropertyKind::Plain,
        }
    }
}

impl LinkedModel for PropertyDefinition {
    fn model_name() -> &'static str {
        "PropertyDefinition"
    }
}
