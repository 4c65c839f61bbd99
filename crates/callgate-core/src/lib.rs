//! Callgate - call routing between in-process service dispatch and a unary
//! wire RPC protocol.
//!
//! For every inter-service call, a [`CallRouter`] asks a [`RedirectPolicy`]
//! whether to run it through the original in-process call path or re-issue
//! it over the wire to the remote instance of the target service. On the
//! receiving side, [`start_server`] exposes in-process actions as wire
//! endpoints and translates their failures into wire statuses.
//!
//! # Example
//!
//! ```rust,ignore
//! use callgate::{AllowList, CallOptions, CallRouter, NodeId};
//!
//! let router = CallRouter::builder(
//!     NodeId::new("node-1"),
//!     AllowList::new().allow_service("1.users"),
//! )
//! .build();
//!
//! // `broker` implements `InProcessCall`
//! let profile = router
//!     .call(&broker, "1.users.getProfile", json!({"id": 7}), &CallOptions::new())
//!     .await?;
//! ```

pub mod action;
pub mod adapter;
pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod router;
pub mod service_error;
pub mod status;
pub mod wire;

// Re-export commonly used types
pub use action::{ActionName, EndpointAddress};
pub use adapter::{action_fn, create_service, ActionHandler, ActionMap, ServiceAction};
pub use bootstrap::{start_server, ServerOptions};
pub use codec::{default_codec, Codec, JsonCodec, SharedCodec};
pub use config::{StatusConfig, WireConfig};
pub use context::{ActionContext, CallMeta, CallOptions, ContextMeta, NodeId};
pub use error::{CallgateError, Result};
pub use metadata::CallMetadata;
pub use policy::{redirect_when, AllowList, RedirectPolicy};
pub use router::{CallRouter, InProcessCall, RoutedCall, RouterBuilder};
pub use service_error::{ErrorSnapshot, ServiceError};
pub use status::{to_wire_status, translate_failure, WireFailure, WireStatus};
pub use wire::{TcpClientFactory, WireServerHandle};
