//! Scalar node values and metadata values.

use serde::{Deserialize, Serialize};

/// A node's scalar payload, stored as the raw text it was written with.
/// The other three projections (`parsed`, `as_string`, `as_bool`) are
/// computed on demand rather than cached: node values are typically only
/// read a handful of times between writes (by a view render or a patch
/// comparison), so memoizing them would trade a rare recomputation for a
/// cache-invalidation hazard on every `set_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValue {
    pub raw: String,
}

impl NodeValue {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { raw: String::new() }
    }

    /// Parse `raw` as JSON; snippet bodies that are not valid JSON (the
    /// common case — most snippets are source code, not data) fall back
    /// to a JSON string wrapping the raw text unchanged.
    #[must_use]
    pub fn parsed(&self) -> serde_json::Value {
        serde_json::from_str(&self.raw).unwrap_or_else(|_| serde_json::Value::String(self.raw.clone()))
    }

    #[must_use]
    pub fn as_string(&self) -> String {
        self.raw.clone()
    }

    /// `false`, `0`, empty string, and `"false"` are falsy; everything
    /// else (including whitespace-only bodies) is truthy.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        !matches!(self.raw.as_str(), "" | "0" | "false")
    }
}

/// A metadata scalar. Kept as a small closed set (rather than reusing
/// [`serde_json::Value`] wholesale) so selector comparisons have a fixed,
/// easily-typed vocabulary to match against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetaValue {
    #[must_use]
    pub fn as_str_opt(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(i) => Some(*i as f64),
            MetaValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool_opt(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            MetaValue::Str(s) => s.clone(),
            MetaValue::Int(i) => i.to_string(),
            MetaValue::Float(f) => f.to_string(),
            MetaValue::Bool(b) => b.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_raw_values() {
        assert!(!NodeValue::new("").as_bool());
        assert!(!NodeValue::new("0").as_bool());
        assert!(!NodeValue::new("false").as_bool());
        assert!(NodeValue::new("1").as_bool());
        assert!(NodeValue::new("anything").as_bool());
    }

    #[test]
    fn parsed_falls_back_to_string_for_source_code() {
        let v = NodeValue::new("fn main() {}");
        assert_eq!(v.parsed(), serde_json::Value::String("fn main() {}".to_string()));
    }

    #[test]
    fn parsed_recognizes_json_bodies() {
        let v = NodeValue::new("42");
        assert_eq!(v.parsed(), serde_json::json!(42));
    }
}
