//! Typed property values

use std::fmt;

/// Value held by a property
///
/// Enumerated values carry their closed option set so that external writes
/// can be validated without consulting a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `true` / `false`
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Free-form string
    Str(String),
    /// One of a fixed set of strings
    Enum {
        value: String,
        options: &'static [&'static str],
    },
}

impl Value {
    /// Create a string value
    pub fn string(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    /// Create an enumerated value
    ///
    /// Falls back to the first option when `value` is not a member.
    pub fn enumeration(value: &str, options: &'static [&'static str]) -> Self {
        let value = if options.contains(&value) {
            value
        } else {
            options.first().copied().unwrap_or_default()
        };
        Value::Enum {
            value: value.to_string(),
            options,
        }
    }

    /// Boolean content, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String content of a string or enumerated value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Enum { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether `other` may be stored where this value lives
    pub fn same_kind(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(_), Value::Bool(_))
            | (Value::Int(_), Value::Int(_))
            | (Value::Str(_), Value::Str(_)) => true,
            (Value::Enum { options: a, .. }, Value::Enum { value, options: b }) => {
                a == b && a.contains(&value.as_str())
            }
            _ => false,
        }
    }

    /// Parse wire text into a value of the same kind as `self`
    pub fn parse_like(&self, raw: &str) -> Option<Value> {
        match self {
            Value::Bool(_) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            Value::Int(_) => raw.parse().ok().map(Value::Int),
            Value::Str(_) => Some(Value::Str(raw.to_string())),
            Value::Enum { options, .. } => options
                .iter()
                .find(|opt| opt.eq_ignore_ascii_case(raw))
                .map(|opt| Value::Enum {
                    value: opt.to_string(),
                    options,
                }),
        }
    }

    /// Plain JSON projection used by tree snapshots
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Enum { value, .. } => serde_json::Value::String(value.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::Enum { value, .. } => write!(f, "{}", value),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
