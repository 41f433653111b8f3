//! File reference model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serde_util;
use super::LinkedModel;

/// Root under which uploaded files are served
pub const UPLOAD_DIR: &str = "/upload";

/// A stored file.
///
/// Known columns are parsed leniently; every other selected column is kept
/// in `extra`, and columns that were not selected stay absent on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct File {
    #[serde(rename = "ID", deserialize_with = "serde_util::int")]
    pub id: i64,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(deserialize_with = "serde_util::opt_int", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(deserialize_with = "serde_util::opt_int", skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(deserialize_with = "serde_util::opt_int", skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(deserialize_with = "serde_util::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Selected columns without a dedicated field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl File {
    /// Public path of the file
    pub fn src(&self) -> String {
        let file_name = self.file_name.as_deref().unwrap_or_default();
        match self.subdir.as_deref() {
            Some(subdir) if !subdir.is_empty() => format!("{}/{}/{}", UPLOAD_DIR, subdir, file_name),
            _ => format!("{}/{}", UPLOAD_DIR, file_name),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("image/"))
    }
}

impl LinkedModel for File {
    fn model_name() -> &'static str {
        "File"
    }
}
