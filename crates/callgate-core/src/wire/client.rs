//! Generic unary wire client.
//!
//! A [`ClientFactory`] builds a client for one endpoint and one service
//! schema; the client then performs unary exchanges over a single TCP
//! connection.
//!
//! # Thread Safety
//!
//! `TcpUnaryClient` serializes access to its stream with a tokio `Mutex`.
//! The router never shares a client between calls, but nothing breaks if a
//! caller does.

use super::protocol::{
    decode_envelope, encode_envelope, read_frame, write_frame, RequestHead, ResponseHead,
};
use super::schema::ServiceDefinition;
use super::ChannelCredentials;
use crate::action::EndpointAddress;
use crate::config::WireConfig;
use crate::metadata::CallMetadata;
use crate::status::{WireFailure, WireStatus};
use crate::{CallgateError, Result};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// A client able to invoke the methods of one service.
#[async_trait::async_trait]
pub trait UnaryClient: Send + Sync {
    /// Send one request and await exactly one response.
    async fn unary(&self, method: &str, request: &Value, metadata: CallMetadata) -> Result<Value>;
}

/// Builds clients scoped to a service schema.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    /// Connect to `endpoint`. Failing to reach it is a construction error.
    async fn connect(
        &self,
        endpoint: &EndpointAddress,
        service: ServiceDefinition,
        credentials: ChannelCredentials,
    ) -> Result<Box<dyn UnaryClient>>;
}

/// Connects over TCP, resolving endpoint host names through DNS unless a
/// static route overrides them.
#[derive(Debug, Clone, Default)]
pub struct TcpClientFactory {
    static_routes: HashMap<String, SocketAddr>,
}

impl TcpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send traffic for `endpoint` (e.g. `users-1:5000`) to `addr` instead.
    pub fn with_static_route(mut self, endpoint: impl Into<String>, addr: SocketAddr) -> Self {
        self.static_routes.insert(endpoint.into(), addr);
        self
    }

    async fn open_stream(&self, endpoint: &EndpointAddress) -> std::io::Result<TcpStream> {
        match self.static_routes.get(&endpoint.to_string()) {
            Some(addr) => TcpStream::connect(*addr).await,
            None => TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await,
        }
    }
}

#[async_trait::async_trait]
impl ClientFactory for TcpClientFactory {
    async fn connect(
        &self,
        endpoint: &EndpointAddress,
        service: ServiceDefinition,
        _credentials: ChannelCredentials,
    ) -> Result<Box<dyn UnaryClient>> {
        let connect_error = |message: String| CallgateError::Connect {
            endpoint: endpoint.to_string(),
            message,
        };

        let stream = tokio::time::timeout(WireConfig::CONNECT_TIMEOUT, self.open_stream(endpoint))
            .await
            .map_err(|_| {
                connect_error(format!(
                    "timed out after {:?}",
                    WireConfig::CONNECT_TIMEOUT
                ))
            })?
            .map_err(|e| connect_error(e.to_string()))?;

        debug!("Wire client connected to {} for service '{}'", endpoint, service.name);

        Ok(Box::new(TcpUnaryClient {
            stream: Mutex::new(stream),
            endpoint: endpoint.clone(),
            service,
        }))
    }
}

/// Unary client over one TCP connection.
pub struct TcpUnaryClient {
    stream: Mutex<TcpStream>,
    endpoint: EndpointAddress,
    service: ServiceDefinition,
}

impl TcpUnaryClient {
    pub fn endpoint(&self) -> &EndpointAddress {
        &self.endpoint
    }

    async fn exchange(&self, envelope: &[u8]) -> Result<Option<Bytes>> {
        let mut stream = self.stream.lock().await;
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, envelope).await?;
        read_frame(&mut reader).await
    }

    fn unavailable(&self, details: String) -> CallgateError {
        CallgateError::Remote(WireFailure::new(
            WireStatus::Unavailable,
            details,
            CallMetadata::new(),
        ))
    }
}

#[async_trait::async_trait]
impl UnaryClient for TcpUnaryClient {
    async fn unary(&self, method: &str, request: &Value, metadata: CallMetadata) -> Result<Value> {
        let descriptor = self
            .service
            .method(method)
            .ok_or_else(|| CallgateError::Validation {
                field: "method".to_string(),
                message: format!(
                    "'{}' is not part of service '{}'",
                    method, self.service.name
                ),
            })?;

        let body = descriptor.codec.encode(request)?;
        let head = RequestHead {
            path: descriptor.path.clone(),
            metadata,
        };
        let envelope = encode_envelope(&head, &body)?;

        // A broken transport is reported the way the peer would: UNAVAILABLE.
        let frame = match self.exchange(&envelope).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(self.unavailable(format!(
                    "{} closed the connection before responding",
                    self.endpoint
                )));
            }
            Err(CallgateError::Io { message, .. }) => {
                return Err(self.unavailable(format!(
                    "transport failure talking to {}: {}",
                    self.endpoint, message
                )));
            }
            Err(e) => return Err(e),
        };

        let (head, body): (ResponseHead, Bytes) = decode_envelope(frame)?;
        if head.status != WireStatus::Ok {
            return Err(CallgateError::Remote(WireFailure::new(
                head.status,
                head.details.unwrap_or_default(),
                head.metadata,
            )));
        }

        descriptor.codec.decode(&body)
    }
}
