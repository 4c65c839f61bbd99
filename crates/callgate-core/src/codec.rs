//! Byte-level (de)serialization of call arguments and results.

use crate::Result;
use bytes::Bytes;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Pluggable payload codec shared by the outbound and inbound paths.
///
/// Implementations must round-trip every JSON-representable value exactly.
pub trait Codec: Send + Sync + Debug {
    fn encode(&self, value: &Value) -> Result<Bytes>;
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// Shared codec handle.
pub type SharedCodec = Arc<dyn Codec>;

/// UTF-8 JSON text codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The codec used when none is configured.
pub fn default_codec() -> SharedCodec {
    Arc::new(JsonCodec)
}
