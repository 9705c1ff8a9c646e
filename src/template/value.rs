// ABOUTME: Typed template values and the ordered variable set they live in
// ABOUTME: Handles truthiness, display and coercion of raw override strings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resolved template value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Int,
    Bool,
}

impl Value {
    /// Non-zero numbers, non-empty strings and `true` are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::String,
        }
    }

    /// Coerce a raw string (CLI flag, environment, config file) into `kind`.
    /// Returns `None` when the text is not a valid value of that kind.
    pub fn parse_as(kind: ValueKind, raw: &str) -> Option<Value> {
        match kind {
            ValueKind::String => Some(Value::Str(raw.to_string())),
            ValueKind::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            ValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

impl ValueKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ValueKind::String => "a string",
            ValueKind::Int => "an integer",
            ValueKind::Bool => "a boolean (true/false/yes/no/on/off/1/0)",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&Value> for minijinja::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => minijinja::Value::from(*b),
            Value::Int(n) => minijinja::Value::from(*n),
            Value::Str(s) => minijinja::Value::from(s.as_str()),
        }
    }
}

impl From<&minijinja::Value> for Value {
    /// Anything that is neither a boolean nor an integer renders as text.
    fn from(value: &minijinja::Value) -> Self {
        use minijinja::value::ValueKind as JinjaKind;

        match value.kind() {
            JinjaKind::Bool => Value::Bool(value.is_true()),
            JinjaKind::Number => i64::try_from(value.clone())
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Str(value.to_string())),
            _ => Value::Str(
                value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
            ),
        }
    }
}

/// Effective variables for one service render, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariableSet {
    values: IndexMap<String, Value>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. A replaced key keeps its original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
