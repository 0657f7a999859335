//! Typed variable context for provision and bind requests

use serde_json::{Map, Value};

use crate::errors::{BrokerError, Result};

/// A key/value map of request variables with typed, validating accessors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarContext {
    values: Map<String, Value>,
}

impl VarContext {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Build a context from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(BrokerError::Internal(format!(
                "variable context must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a value converted to a string
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.validate(key, "string", cast_string)
    }

    /// Get a value converted to a boolean.
    ///
    /// Numbers behave C style (0 is false) and the usual textual spellings of
    /// booleans are accepted.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.validate(key, "boolean", cast_bool)
    }

    /// A copy of the underlying map
    pub fn to_map(&self) -> Map<String, Value> {
        self.values.clone()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    fn validate<T>(&self, key: &str, type_name: &str, cast: impl Fn(&Value) -> Option<T>) -> Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| BrokerError::MissingKey(key.to_string()))?;

        cast(value).ok_or_else(|| BrokerError::WrongType {
            key: key.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

impl From<Map<String, Value>> for VarContext {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}

/// Convert a scalar JSON value to its string form
pub fn cast_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_to_string(n)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_to_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn cast_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Null => Some(false),
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.as_str() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        },
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Truthiness of a JSON value, using the boolean conversion rules
pub fn is_truthy(value: &Value) -> bool {
    cast_bool(value).unwrap_or(false)
}
