//! Lenient deserializers for columns that arrive as strings or numbers

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::value::to_int;

/// Integer column that may be stored as a numeric string; empty means 0
pub fn int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_int(deserializer)?.unwrap_or(0))
}

pub fn opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::String(ref s) if s.trim().is_empty() => Ok(None),
        other => to_int(&other)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {}", other))),
    }
}

/// Text column; numbers are printed, null becomes empty
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Text column that may be absent; null stays absent
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// `"Y"`/`"N"` flag column, booleans accepted as well
pub fn yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("Y"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    })
}

pub mod yes_no_flag {
    use serde::Serializer;

    pub fn serialize<S>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *flag { "Y" } else { "N" })
    }

    pub use super::yes_no as deserialize;
}

/// [`yes_no_flag`] for a column that may be absent
pub mod opt_yes_no_flag {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(flag: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match flag {
            Some(flag) => super::yes_no_flag::serialize(flag, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(None);
        }
        super::yes_no(value).map(Some).map_err(serde::de::Error::custom)
    }
}
