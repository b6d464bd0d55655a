//! Runtime values of the rule language.

use std::collections::BTreeMap;
use std::fmt;

/// A script value. Values are copied on assignment; there are no references.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Arrays and objects a program builds may nest at most this deep.
    pub const MAX_DEPTH: usize = 64;

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether arrays and objects nest more than `limit` levels deep in this
    /// value. Only the first `limit + 1` levels are visited.
    pub fn deeper_than(&self, limit: usize) -> bool {
        match self {
            Value::Array(items) => limit == 0 || items.iter().any(|v| v.deeper_than(limit - 1)),
            Value::Object(map) => limit == 0 || map.values().any(|v| v.deeper_than(limit - 1)),
            _ => false,
        }
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn opt_str(s: Option<&str>) -> Value {
        s.map(Value::str).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(","))
            }
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

/// Numbers print without a fractional part when they are whole.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Array(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_follows_javascript() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(Value::str("x").is_truthy());
    }

    #[test]
    fn test_whole_numbers_print_as_integers() {
        assert_eq!(Value::Number(9.0).to_string(), "9");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_deeper_than_counts_container_levels() {
        let inner = Value::Array(vec![Value::Number(1.0)]);
        let outer = Value::Object([("k".to_string(), inner.clone())].into_iter().collect());
        assert!(!Value::Number(1.0).deeper_than(0));
        assert!(inner.deeper_than(0));
        assert!(!inner.deeper_than(1));
        assert!(outer.deeper_than(1));
        assert!(!outer.deeper_than(2));
    }
}
