//! User reference model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serde_util;
use super::LinkedModel;

/// A user account.
///
/// Only selected columns are carried: absent columns stay absent, and any
/// column without a dedicated field is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct User {
    #[serde(rename = "ID", deserialize_with = "serde_util::int")]
    pub id: i64,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub second_name: Option<String>,
    #[serde(with = "serde_util::opt_yes_no_flag", skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(deserialize_with = "serde_util::opt_int", skip_serializing_if = "Option::is_none")]
    pub personal_photo: Option<i64>,
    /// Selected columns without a dedicated field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// "Name Last" with empty parts skipped, the login when both are empty
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            self.login.clone().unwrap_or_default()
        } else {
            parts.join(" ")
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(false)
    }
}

impl LinkedModel for User {
    fn model_name() -> &'static str {
        "User"
    }
}
