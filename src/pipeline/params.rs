//! Step parameter payloads
//!
//! Parameters arrive from YAML loosely typed. They are normalised on load into
//! [`Params`], a tagged variant that handlers match on instead of probing
//! dynamic values.

#![allow(clippy::must_use_candidate)]

use crate::pipeline::errors::StepError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Parameter payload of a step
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Params {
    /// No parameters given
    #[default]
    Null,
    /// Typed boolean leaf
    Bool(bool),
    /// Typed integer leaf
    Integer(i64),
    /// Typed float leaf
    Float(f64),
    /// Single string
    Scalar(String),
    /// Ordered list of strings
    List(Vec<String>),
    /// String-keyed mapping of nested parameters
    Mapping(BTreeMap<String, Params>),
}

impl Params {
    /// Creates a scalar parameter
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Creates a list parameter
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Creates a mapping parameter from key/value pairs
    pub fn mapping<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Params)>,
        K: Into<String>,
    {
        Self::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "nothing",
            Self::Bool(_) => "a boolean",
            Self::Integer(_) | Self::Float(_) => "a number",
            Self::Scalar(_) => "a string",
            Self::List(_) => "a list",
            Self::Mapping(_) => "a mapping",
        }
    }

    /// Returns the string if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the items if this is a list
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries if this is a mapping
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Params>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a nested value when this is a mapping
    pub fn get(&self, key: &str) -> Option<&Params> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Looks up a mapping entry and renders scalar leaves as text
    ///
    /// Numbers and booleans are rendered with their display form so that
    /// `port: 8080` can be read as a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Params::to_text)
    }

    /// Like [`Params::get_str`] but tries several keys in order
    pub fn get_str_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get_str(key))
    }

    /// Renders a scalar-like leaf as text
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Scalar(s) => Some(s.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Null | Self::List(_) | Self::Mapping(_) => None,
        }
    }

    /// Splits a scalar or list into words for verb-style commands
    ///
    /// Scalars are tokenized with shell quoting rules, so
    /// `"mv '/tmp/a b' /opt"` yields three words.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidParams`] for mappings, typed leaves, or a
    /// scalar with unbalanced quotes.
    pub fn words(&self, command: &str) -> Result<Vec<String>, StepError> {
        match self {
            Self::Scalar(line) => shell_words::split(line)
                .map_err(|e| StepError::invalid_params(command, format!("cannot tokenize '{line}': {e}"))),
            Self::List(items) => Ok(items.clone()),
            other => Err(StepError::invalid_params(
                command,
                format!("expected a string or a list, got {}", other.kind()),
            )),
        }
    }

    /// Converts to a JSON value, e.g. for request bodies and result payloads
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Scalar(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::from(items.clone()),
            Self::Mapping(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl TryFrom<Value> for Params {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => Ok(n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Integer)),
            Value::String(s) => Ok(Self::Scalar(s)),
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| {
                    scalar_text(&item)
                        .ok_or_else(|| "list parameters may only contain plain values".to_string())
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Mapping(map) => map
                .into_iter()
                .map(|(key, value)| -> Result<(String, Self), String> {
                    let key = scalar_text(&key)
                        .ok_or_else(|| "mapping keys must be plain values".to_string())?;
                    Ok((key, Self::try_from(value)?))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Mapping),
            Value::Tagged(tagged) => Self::try_from(tagged.value),
        }
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Renders a YAML scalar as text; `None` for null and collections
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn from_yaml(src: &str) -> Result<Params, serde_yaml::Error> {
        serde_yaml::from_str(src)
    }

    #[test]
    fn test_scalar_from_yaml() {
        assert_eq!(from_yaml("echo hi").unwrap(), Params::scalar("echo hi"));
    }

    #[test]
    fn test_list_coerces_numbers() {
        let params = from_yaml("[mkdir, /opt/app, 42, true]").unwrap();
        assert_eq!(params, Params::list(["mkdir", "/opt/app", "42", "true"]));
    }

    #[test]
    fn test_nested_list_is_rejected() {
        let err = from_yaml("[a, [b, c]]").unwrap_err();
        assert!(err.to_string().contains("plain values"));
    }

    #[test]
    fn test_nested_mapping() {
        let params = from_yaml(
            "method: POST\nheader:\n  Accept: application/json\nretries: 3\n",
        )
        .unwrap();
        assert_eq!(params.get_str("method").as_deref(), Some("POST"));
        assert_eq!(params.get_str("retries").as_deref(), Some("3"));
        assert_eq!(
            params.get("header").and_then(|h| h.get_str("Accept")).as_deref(),
            Some("application/json")
        );
        assert_eq!(params.get("retries"), Some(&Params::Integer(3)));
    }

    #[test]
    fn test_missing_is_null() {
        assert_eq!(from_yaml("~").unwrap(), Params::Null);
    }

    #[test]
    fn test_words_respects_quotes() {
        let params = Params::scalar("mv '/tmp/a b' /opt");
        assert_eq!(params.words("dirs").unwrap(), vec!["mv", "/tmp/a b", "/opt"]);
    }

    #[test]
    fn test_words_rejects_mapping() {
        let params = Params::mapping([("a", Params::scalar("b"))]);
        let err = params.words("dirs").unwrap_err();
        assert!(matches!(err, StepError::InvalidParams { .. }));
    }

    #[test]
    fn test_to_json_mapping() {
        let params = Params::mapping([
            ("name", Params::scalar("svc")),
            ("port", Params::Integer(80)),
        ]);
        assert_eq!(
            params.to_json(),
            serde_json::json!({"name": "svc", "port": 80})
        );
    }

    #[test]
    fn test_serialize_untagged() {
        let json = serde_json::to_string(&Params::list(["a", "b"])).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }
}
