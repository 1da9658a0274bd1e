use crate::error::VariableError;
use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()-_=+";

/// A value generator for test data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Generator {
    RandomString {
        length: usize,
        #[serde(default = "default_true")]
        include_digits: bool,
        #[serde(default)]
        include_special: bool,
    },
    RandomInt {
        min: i64,
        max: i64,
    },
    Uuid,
    Timestamp {
        #[serde(default)]
        format: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

impl Generator {
    pub fn generate(&self) -> Result<Value, VariableError> {
        match self {
            Self::RandomString {
                length,
                include_digits,
                include_special,
            } => Ok(Value::String(random_string(
                *length,
                *include_digits,
                *include_special,
            ))),
            Self::RandomInt { min, max } => random_int(*min, *max).map(Value::from),
            Self::Uuid => Ok(Value::String(uuid())),
            Self::Timestamp { format } => {
                timestamp(format.as_deref().unwrap_or("iso"))
            }
        }
    }
}

pub fn random_string(
    length: usize,
    include_digits: bool,
    include_special: bool,
) -> String {
    let mut charset = String::from(LETTERS);
    if include_digits {
        charset.push_str(DIGITS);
    }
    if include_special {
        charset.push_str(SPECIAL);
    }
    let chars: Vec<char> = charset.chars().collect();
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}

/// Uniform integer in `min..=max`.
pub fn random_int(min: i64, max: i64) -> Result<i64, VariableError> {
    if min > max {
        return Err(VariableError::InvalidGenerator(format!(
            "random int range is empty: {min} > {max}"
        )));
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

pub fn uuid() -> String {
    ::uuid::Uuid::new_v4().to_string()
}

/// Current time. `iso` gives RFC 3339, `unix` / `unix_ms` give an
/// integer epoch, anything else is a strftime pattern.
pub fn timestamp(format: &str) -> Result<Value, VariableError> {
    let now = Utc::now();
    match format {
        "iso" => Ok(Value::String(now.to_rfc3339())),
        "unix" => Ok(Value::from(now.timestamp())),
        "unix_ms" => Ok(Value::from(now.timestamp_millis())),
        pattern => {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(VariableError::InvalidGenerator(format!(
                    "invalid timestamp format '{pattern}'"
                )));
            }
            Ok(Value::String(
                now.format_with_items(StrftimeItems::new(pattern)).to_string(),
            ))
        }
    }
}
