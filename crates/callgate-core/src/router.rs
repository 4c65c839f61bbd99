//! Outbound call routing.
//!
//! Every in-process call goes through [`CallRouter::call`]. The configured
//! [`RedirectPolicy`] decides whether it is dispatched unchanged through the
//! original in-process path or re-issued over the wire to the remote instance
//! of the target service.
//!
//! A redirected call builds a fresh client scoped to the single action being
//! invoked, sends one request with the propagated metadata and drops the
//! client once the call settles. There is no pooling, no retry and no
//! fallback to the in-process path once the wire path has been chosen.

use crate::action::ActionName;
use crate::codec::{default_codec, SharedCodec};
use crate::context::{CallOptions, NodeId};
use crate::metadata::{CallMetadata, ACCESS_TOKEN_KEY, CALLER_NODE_KEY, REQUEST_ID_KEY};
use crate::policy::RedirectPolicy;
use crate::wire::{ChannelCredentials, ClientFactory, ServiceDefinition, TcpClientFactory};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The in-process framework's native call entry point.
#[async_trait::async_trait]
pub trait InProcessCall: Send + Sync {
    async fn call(&self, action: &str, params: Value, opts: &CallOptions) -> Result<Value>;
}

/// Routes calls between the in-process path and the wire.
#[derive(Clone)]
pub struct CallRouter {
    policy: Arc<dyn RedirectPolicy>,
    factory: Arc<dyn ClientFactory>,
    codec: SharedCodec,
    node_id: NodeId,
}

/// Builder for [`CallRouter`].
pub struct RouterBuilder {
    policy: Arc<dyn RedirectPolicy>,
    factory: Arc<dyn ClientFactory>,
    codec: SharedCodec,
    node_id: NodeId,
}

impl RouterBuilder {
    /// Use a custom client factory instead of plain TCP.
    pub fn client_factory(mut self, factory: impl ClientFactory + 'static) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn codec(mut self, codec: SharedCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn build(self) -> CallRouter {
        CallRouter {
            policy: self.policy,
            factory: self.factory,
            codec: self.codec,
            node_id: self.node_id,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

impl CallRouter {
    /// Start building a router for the local node `node_id`.
    pub fn builder(node_id: NodeId, policy: impl RedirectPolicy + 'static) -> RouterBuilder {
        RouterBuilder {
            policy: Arc::new(policy),
            factory: Arc::new(TcpClientFactory::new()),
            codec: default_codec(),
            node_id,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Route one call.
    ///
    /// When the policy declines, `original` is invoked exactly as the caller
    /// invoked the router and its outcome is returned untouched.
    pub async fn call(
        &self,
        original: &dyn InProcessCall,
        action: &str,
        params: Value,
        opts: &CallOptions,
    ) -> Result<Value> {
        if !self.policy.should_redirect(action, &params, opts).await? {
            debug!("'{}' going through in-process dispatch: not redirected", action);
            return original.call(action, params, opts).await;
        }

        self.call_remote(action, params, opts).await
    }

    /// Issue a call over the wire, skipping the policy.
    pub async fn call_remote(
        &self,
        action: &str,
        params: Value,
        opts: &CallOptions,
    ) -> Result<Value> {
        let name = ActionName::parse(action)?;
        let endpoint = name.endpoint();

        debug!("'{}' going through the wire via '{}'", action, endpoint);

        let build_started = Instant::now();
        let service =
            ServiceDefinition::unary(name.service.clone(), [name.action.clone()], &self.codec);
        let client = self
            .factory
            .connect(&endpoint, service, ChannelCredentials::Insecure)
            .await?;
        debug!(
            "'{}' client took {:.2}ms to build",
            action,
            elapsed_ms(build_started)
        );

        let metadata = self.outgoing_metadata(opts);

        let call_started = Instant::now();
        match client.unary(&name.action, &params, metadata).await {
            Ok(response) => {
                debug!(
                    "'{}' received positive response from '{}' in {:.2}ms: {}",
                    action,
                    endpoint,
                    elapsed_ms(call_started),
                    response
                );
                Ok(response)
            }
            Err(e) => {
                debug!(
                    "'{}' received negative response from '{}': {}",
                    action, endpoint, e
                );
                Err(e)
            }
        }
    }

    /// Metadata attached to a redirected call.
    ///
    /// The caller key carries this node's identity, never a value from `opts`.
    pub fn outgoing_metadata(&self, opts: &CallOptions) -> CallMetadata {
        let mut metadata = CallMetadata::new();
        if let Some(token) = opts.meta.token.as_deref().filter(|t| !t.is_empty()) {
            metadata.insert(ACCESS_TOKEN_KEY, token);
        }
        if let Some(request_id) = opts.request_id.as_deref().filter(|r| !r.is_empty()) {
            metadata.insert(REQUEST_ID_KEY, request_id);
        }
        if opts.caller {
            metadata.insert(CALLER_NODE_KEY, self.node_id.as_str());
        }
        metadata
    }

    /// Bind the router to an original call path, producing a drop-in
    /// replacement for it.
    pub fn bind(&self, original: Arc<dyn InProcessCall>) -> RoutedCall {
        RoutedCall {
            router: self.clone(),
            original,
        }
    }
}

/// A router bound to one original call path.
#[derive(Clone)]
pub struct RoutedCall {
    router: CallRouter,
    original: Arc<dyn InProcessCall>,
}

#[async_trait::async_trait]
impl InProcessCall for RoutedCall {
    async fn call(&self, action: &str, params: Value, opts: &CallOptions) -> Result<Value> {
        self.router
            .call(self.original.as_ref(), action, params, opts)
            .await
    }
}
