//! Wire framing and unary envelopes.
//!
//! Every message is a length-prefixed frame whose payload is an envelope: a
//! length-prefixed JSON head followed by the codec-encoded body.
//!
//! ```text
//! frame:    [u32 BE: len][envelope of len bytes]
//! envelope: [u32 BE: head_len][JSON head][body bytes]
//! ```

use crate::config::WireConfig;
use crate::metadata::CallMetadata;
use crate::status::WireStatus;
use crate::{CallgateError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Head of a unary request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHead {
    /// Method path, `/{action}`.
    pub path: String,
    #[serde(default)]
    pub metadata: CallMetadata,
}

/// Head of a unary response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHead {
    pub status: WireStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub metadata: CallMetadata,
}

impl ResponseHead {
    pub fn ok() -> Self {
        Self {
            status: WireStatus::Ok,
            details: None,
            metadata: CallMetadata::new(),
        }
    }

    pub fn failed(status: WireStatus, details: impl Into<String>, metadata: CallMetadata) -> Self {
        Self {
            status,
            details: Some(details.into()),
            metadata,
        }
    }
}

/// Validation field reported when an encoded head is over `MAX_HEAD_SIZE`.
pub const HEAD_FIELD: &str = "wire_head";
/// Validation field reported when a frame is over `MAX_FRAME_SIZE`.
pub const FRAME_FIELD: &str = "wire_frame";

/// Whether `err` is a size-limit rejection for `field`.
pub fn is_oversized(err: &CallgateError, field: &str) -> bool {
    matches!(err, CallgateError::Validation { field: f, .. } if f == field)
}

/// Encode a head and body into one envelope.
///
/// Fails without producing anything when the head or the whole envelope is
/// over the limit the receiving side enforces.
pub fn encode_envelope<H: Serialize>(head: &H, body: &[u8]) -> Result<Bytes> {
    let head_bytes = serde_json::to_vec(head)?;
    if head_bytes.len() > WireConfig::MAX_HEAD_SIZE {
        return Err(CallgateError::Validation {
            field: HEAD_FIELD.to_string(),
            message: format!(
                "Head size {} exceeds maximum {}",
                head_bytes.len(),
                WireConfig::MAX_HEAD_SIZE
            ),
        });
    }

    let total = 4 + head_bytes.len() + body.len();
    if total > WireConfig::MAX_FRAME_SIZE {
        return Err(CallgateError::Validation {
            field: FRAME_FIELD.to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                total,
                WireConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut buf = BytesMut::with_capacity(4 + head_bytes.len() + body.len());
    buf.put_u32(head_bytes.len() as u32);
    buf.put_slice(&head_bytes);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Split an envelope into its decoded head and raw body.
pub fn decode_envelope<H: DeserializeOwned>(envelope: Bytes) -> Result<(H, Bytes)> {
    if envelope.len() < 4 {
        return Err(CallgateError::Protocol {
            message: format!("envelope too short ({} bytes)", envelope.len()),
        });
    }

    let head_len =
        u32::from_be_bytes([envelope[0], envelope[1], envelope[2], envelope[3]]) as usize;
    if head_len > WireConfig::MAX_HEAD_SIZE || 4 + head_len > envelope.len() {
        return Err(CallgateError::Protocol {
            message: format!(
                "invalid head length {} for envelope of {} bytes",
                head_len,
                envelope.len()
            ),
        });
    }

    let head: H = serde_json::from_slice(&envelope[4..4 + head_len])?;
    let body = envelope.slice(4 + head_len..);
    Ok((head, body))
}

/// Read a length-prefixed frame from an async reader.
///
/// Frame format: `[4-byte BE u32 length][payload bytes]`
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Bytes>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > WireConfig::MAX_FRAME_SIZE {
        return Err(CallgateError::Validation {
            field: FRAME_FIELD.to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                len,
                WireConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Bytes::from(payload)))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > WireConfig::MAX_FRAME_SIZE {
        return Err(CallgateError::Validation {
            field: FRAME_FIELD.to_string(),
            message: format!(
                "Frame size {} exceeds maximum {}",
                payload.len(),
                WireConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
