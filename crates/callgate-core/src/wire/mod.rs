//! Unary wire RPC transport.
//!
//! A small binary RPC protocol carrying one request and one response per
//! exchange, with per-call string metadata and the standard status codes.
//!
//! # Architecture
//!
//! - **Protocol**: framing and request/response envelopes
//! - **Schema**: per-service method descriptors (path + codec)
//! - **Client**: generic client factory and unary client
//! - **Server**: generic server dispatching paths to unary handlers

pub mod client;
pub mod protocol;
pub mod schema;
pub mod server;

pub use client::{ClientFactory, TcpClientFactory, TcpUnaryClient, UnaryClient};
pub use protocol::{RequestHead, ResponseHead};
pub use schema::{MethodDescriptor, ServiceDefinition};
pub use server::{HandlerMap, UnaryHandler, WireServer, WireServerHandle};

/// Channel credentials for outbound connections. Only plaintext is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelCredentials {
    #[default]
    Insecure,
}

/// Listener credentials for the server. Only plaintext is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerCredentials {
    #[default]
    Insecure,
}
