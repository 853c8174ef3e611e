use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single step parameter value as written in the workflow spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
}

impl ParamValue {
    /// Short type name used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Number(_) => "number",
            ParamValue::String(_) => "string",
            ParamValue::List(_) => "list",
            ParamValue::Map(_) => "mapping",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Apply `f` to every string in this value, descending into lists and maps.
    pub fn map_strings(&mut self, f: &impl Fn(&str) -> Option<String>) {
        match self {
            ParamValue::String(s) => {
                if let Some(replaced) = f(s) {
                    *s = replaced;
                }
            }
            ParamValue::List(items) => items.iter_mut().for_each(|v| v.map_strings(f)),
            ParamValue::Map(map) => map.values_mut().for_each(|v| v.map_strings(f)),
            ParamValue::Bool(_) | ParamValue::Number(_) => {}
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Typed decoding failure for a step parameter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing required parameter '{0}'")]
    Missing(String),

    #[error("parameter '{key}' must be a {expected}, got {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("parameter '{key}' is invalid: {reason}")]
    Invalid { key: String, reason: String },
}

impl ParamError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ParamError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Ordered parameter mapping of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ParamValue)> {
        self.0.iter_mut()
    }

    /// True when `key` holds a non-empty string.
    pub fn has_value(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(ParamValue::String(s)) if !s.is_empty())
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ParamError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    /// Like [`Params::get_str`] but an absent or empty value is an error.
    pub fn require_str(&self, key: &str) -> Result<&str, ParamError> {
        match self.get_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ParamError::Missing(key.to_string())),
        }
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ParamError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Number(n)) => Ok(Some(*n)),
            Some(other) => Err(wrong_type(key, "number", other)),
        }
    }

    /// Non-negative integer parameter.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ParamError> {
        match self.get_f64(key)? {
            None => Ok(None),
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 => Ok(Some(n as u64)),
            Some(n) => Err(ParamError::invalid(
                key,
                format!("expected a non-negative integer, got {}", n),
            )),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ParamError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(ParamValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(wrong_type(key, "boolean", other)),
        }
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &ParamValue) -> ParamError {
    ParamError::WrongType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}
