//! Parameter context for a single render

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar parameter value as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl Value {
    /// Condition truthiness: null, `false` and the empty string are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(_) => true,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Text inserted for an interpolation, before mode substitution
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(true) => Cow::Borrowed("true"),
            Value::Bool(false) => Cow::Borrowed("false"),
            Value::Number(n) => Cow::Owned(n.to_string()),
            Value::String(s) => Cow::Borrowed(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Read-only mapping from parameter name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Absent parameters are falsy
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(Value::is_truthy)
    }

    /// Interpolation text; absent parameters render empty
    pub fn text(&self, name: &str) -> Cow<'_, str> {
        self.get(name).map(Value::as_text).unwrap_or(Cow::Borrowed(""))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        let params = Params::new()
            .with("empty", "")
            .with("text", "x")
            .with("zero", "0")
            .with("word_false", "false")
            .with("null", Value::Null)
            .with("no", false)
            .with("yes", true);

        assert!(!params.is_truthy("missing"));
        assert!(!params.is_truthy("null"));
        assert!(!params.is_truthy("empty"));
        assert!(!params.is_truthy("no"));
        assert!(params.is_truthy("text"));
        assert!(params.is_truthy("zero"));
        assert!(params.is_truthy("word_false"));
        assert!(params.is_truthy("yes"));
    }

    #[test]
    fn test_text_for_absent_and_null() {
        let params = Params::new().with("null", Value::Null);
        assert_eq!(params.text("null"), "");
        assert_eq!(params.text("missing"), "");
    }

    #[test]
    fn test_deserialize_scalars() {
        let params: Params = serde_json::from_str(
            r#"{"s": "2.19.0", "n": 3, "b": true, "z": null}"#,
        )
        .expect("Should deserialize");
        assert_eq!(params.text("s"), "2.19.0");
        assert_eq!(params.text("n"), "3");
        assert_eq!(params.text("b"), "true");
        assert_eq!(params.get("z"), Some(&Value::Null));
        assert!(params.is_truthy("n"));
    }

    #[test]
    fn test_deserialize_rejects_nested_values() {
        assert!(serde_json::from_str::<Params>(r#"{"a": [1, 2]}"#).is_err());
        assert!(serde_json::from_str::<Params>(r#"{"a": {"b": 1}}"#).is_err());
    }

    #[test]
    fn test_collect_from_pairs() {
        let params: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params.text("b"), "2");
    }
}
