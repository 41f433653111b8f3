//! Configuration shared by the property dispatchers

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchResult};

/// Upper bound of value columns a single query may select
pub const DEFAULT_MAX_SELECT_FIELDS: usize = 45;

/// Host field receiving the attached property definitions
pub const DEFAULT_DEFINITIONS_KEY: &str = "properties_info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of value columns per query; the join key is selected in addition
    pub max_select_fields: usize,
    /// Field on each host record that receives its schema's definitions
    pub definitions_key: String,
    /// Columns requested from the definition source
    pub definition_select: Vec<String>,
    /// Ordering applied to the definition query
    pub definition_order: Option<String>,
    /// Only load definitions flagged `ACTIVE = "Y"`
    pub active_only: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_select_fields: DEFAULT_MAX_SELECT_FIELDS,
            definitions_key: DEFAULT_DEFINITIONS_KEY.to_string(),
            definition_select: [
                "ID",
                "CODE",
                "NAME",
                "PROPERTY_TYPE",
                "LINK_IBLOCK_ID",
                "MULTIPLE",
                "USER_TYPE",
                "SORT",
                "USER_TYPE_SETTINGS",
            ]
            .iter()
            .map(|field| field.to_string())
            .collect(),
            definition_order: Some("SORT".to_string()),
            active_only: true,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_select_fields(mut self, max_select_fields: usize) -> Self {
        self.max_select_fields = max_select_fields;
        self
    }

    pub fn with_definitions_key(mut self, key: impl Into<String>) -> Self {
        self.definitions_key = key.into();
        self
    }

    pub fn with_definition_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.definition_select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_definition_order(mut self, order: Option<String>) -> Self {
        self.definition_order = order;
        self
    }

    pub fn with_active_only(mut self, active_only: bool) -> Self {
        self.active_only = active_only;
        self
    }

    pub fn validate(&self) -> FetchResult<()> {
        if self.max_select_fields == 0 {
            return Err(FetchError::configuration(
                "max_select_fields must be greater than zero",
            ));
        }

        if self.definitions_key.is_empty() {
            return Err(FetchError::configuration("definitions_key must not be empty"));
        }

        Ok(())
    }
}
