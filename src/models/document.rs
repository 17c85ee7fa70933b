use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A node in the configuration document tree.
///
/// The document is a tree of named sections (persona, provider selection,
/// memory limits, reply-behavior rules, per-guild overrides) whose shape the
/// client deliberately does not interpret beyond two structural rules:
///
/// - Object children are `Arc`-shared, so a path-addressed rebuild clones one
///   map per ancestor level while untouched sibling branches keep their
///   pointer identity. [`crate::config::ConfigStore`] relies on this for the
///   reference-stability contract its callers use for change detection.
/// - Every list-valued leaf is an ordered sequence of strings (ignored
///   channels, keywords, rule lists). Deserializing an array with
///   non-string elements fails at the boundary instead of half-loading.
///
/// Serialization is untagged, so the type round-trips plain JSON documents
/// as served by `GET /config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<String>),
    Object(IndexMap<String, Arc<ConfigValue>>),
}

impl ConfigValue {
    /// Build an object node from key/value pairs, wrapping children in `Arc`.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        ConfigValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Arc::new(v)))
                .collect(),
        )
    }

    /// Build a list leaf from anything yielding string-likes.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Arc<ConfigValue>>> {
        match self {
            ConfigValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, ConfigValue::Object(_))
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        ConfigValue::Number(serde_json::Number::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_plain_json() {
        let json = r#"{
            "bot": { "name": "Botdeck", "persona": "helpful" },
            "memory": { "maxEntries": 50 },
            "replyRules": { "ignoredChannels": ["general", "spam"] }
        }"#;

        let doc: ConfigValue = serde_json::from_str(json).unwrap();
        let bot = doc.as_object().unwrap().get("bot").unwrap();
        assert_eq!(
            bot.as_object().unwrap().get("name").unwrap().as_str(),
            Some("Botdeck")
        );

        let rules = doc.as_object().unwrap().get("replyRules").unwrap();
        let channels = rules
            .as_object()
            .unwrap()
            .get("ignoredChannels")
            .unwrap()
            .as_list()
            .unwrap();
        assert_eq!(channels, ["general", "spam"]);

        // Serializing back yields the same structure
        let reparsed: ConfigValue =
            serde_json::from_str(&serde_json::to_string(&doc).unwrap()).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_key_order_is_preserved() {
        let json = r#"{"zeta": 1, "alpha": 2, "mid": 3}"#;
        let doc: ConfigValue = serde_json::from_str(json).unwrap();
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_mixed_type_array_is_rejected() {
        let json = r#"{"rules": ["ok", 42]}"#;
        assert!(serde_json::from_str::<ConfigValue>(json).is_err());
    }

    #[test]
    fn test_builders() {
        let doc = ConfigValue::object([
            ("enabled", ConfigValue::from(true)),
            ("keywords", ConfigValue::list(["a", "b"])),
        ]);
        assert!(doc.is_object());
        assert_eq!(
            doc.as_object().unwrap().get("enabled").unwrap().as_bool(),
            Some(true)
        );
    }
}
