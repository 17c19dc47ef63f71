//! Session identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::params::ConnectionParameters;

/// Canonical identity of a set of [`ConnectionParameters`].
///
/// The key is a compact JSON document `{"url":…,"config":{"headers":…,"query":…}}`
/// with map entries in sorted order, so equal parameters always produce equal
/// keys regardless of how they were built. `config` and its members are
/// omitted when empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Computes the key for `params`.
    pub fn compute(params: &ConnectionParameters) -> Self {
        let mut config = Map::new();
        if !params.header_map().is_empty() {
            config.insert("headers".into(), sorted_object(params.header_map()));
        }
        if !params.query_map().is_empty() {
            config.insert("query".into(), sorted_object(params.query_map()));
        }

        let mut root = Map::new();
        root.insert("url".into(), Value::String(params.url().to_string()));
        if !config.is_empty() {
            root.insert("config".into(), Value::Object(config));
        }

        Self(Value::Object(root).to_string())
    }

    /// The canonical encoding.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn sorted_object(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

impl From<&ConnectionParameters> for SessionKey {
    fn from(params: &ConnectionParameters) -> Self {
        Self::compute(params)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
