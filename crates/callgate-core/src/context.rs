//! Call options, inbound action contexts and node identity.

use crate::metadata::{ACCESS_TOKEN_KEY, CALLER_NODE_KEY, REQUEST_ID_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of the local node, passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options accompanying an in-process call. Every field is optional; an
/// absent field is simply not propagated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallOptions {
    #[serde(default)]
    pub meta: CallMeta,
    #[serde(default, rename = "requestID")]
    pub request_id: Option<String>,
    /// Ask for the local node's identity to be propagated.
    #[serde(default)]
    pub caller: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMeta {
    /// Opaque bearer credential.
    #[serde(default)]
    pub token: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.meta.token = Some(token.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_caller(mut self, caller: bool) -> Self {
        self.caller = caller;
        self
    }
}

/// Context handed to an in-process action invoked over the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionContext {
    pub meta: ContextMeta,
    pub request_id: Option<String>,
    pub caller_node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextMeta {
    pub token: Option<String>,
    /// When the adapter received the request. Not taken from the caller.
    pub request_start_time: DateTime<Utc>,
}

impl ActionContext {
    /// Rebuild a context from decoded request metadata.
    pub fn from_metadata(metadata: &BTreeMap<String, String>, received_at: DateTime<Utc>) -> Self {
        Self {
            meta: ContextMeta {
                token: metadata.get(ACCESS_TOKEN_KEY).cloned(),
                request_start_time: received_at,
            },
            request_id: metadata.get(REQUEST_ID_KEY).cloned(),
            caller_node_id: metadata.get(CALLER_NODE_KEY).cloned(),
        }
    }
}
