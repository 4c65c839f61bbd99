//! Per-call wire metadata.
//!
//! Keys are lowercased on insert and lookup. Metadata lives for exactly one
//! request or response and is never persisted.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Opaque bearer credential propagated from the caller.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Correlation identifier propagated from the caller.
pub const REQUEST_ID_KEY: &str = "request_id";
/// Identity of the node that placed the call.
pub const CALLER_NODE_KEY: &str = "moleculer.caller_node_id";
/// Serialized structured error, present only on failed responses.
pub const ERROR_KEY: &str = "moleculer.error";

/// Ordered key/value metadata attached to a single wire request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMetadata {
    #[serde(default, deserialize_with = "lowercase_keys")]
    entries: BTreeMap<String, String>,
    /// Hint that the request may be safely repeated.
    #[serde(default)]
    idempotent: bool,
}

// Peers may send mixed-case keys; store them the way `insert` would.
fn lowercase_keys<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value))
        .collect())
}

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&key.to_ascii_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn set_idempotent(&mut self, idempotent: bool) {
        self.idempotent = idempotent;
    }

    /// Flat key to value view, as handed to inbound handlers.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }
}
