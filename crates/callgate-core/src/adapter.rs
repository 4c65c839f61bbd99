//! Inbound service adapter.
//!
//! Exposes a set of named in-process actions as wire endpoints: one unary
//! method per action at path `/{action}`, and one handler per action that
//! rebuilds a minimal call context, invokes the action and replies with
//! either its result or a translated failure.

use crate::codec::SharedCodec;
use crate::context::ActionContext;
use crate::metadata::CallMetadata;
use crate::service_error::{kind, ServiceError};
use crate::status::{resolve_wire_status, StatusResolution, WireFailure, WireStatus};
use crate::wire::{HandlerMap, ServiceDefinition, UnaryHandler};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// An in-process action that can be exposed over the wire.
#[async_trait::async_trait]
pub trait ServiceAction: Send + Sync + 'static {
    async fn invoke(&self, params: Value, ctx: ActionContext) -> Result<Value, ServiceError>;
}

/// Actions keyed by the name they are exposed under.
pub type ActionMap = BTreeMap<String, Arc<dyn ServiceAction>>;

type ActionFuture = BoxFuture<'static, Result<Value, ServiceError>>;

/// Action backed by an async closure.
pub struct FnAction {
    f: Box<dyn Fn(Value, ActionContext) -> ActionFuture + Send + Sync>,
}

/// Wrap an async closure as a [`ServiceAction`].
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn ServiceAction>
where
    F: Fn(Value, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    Arc::new(FnAction {
        f: Box::new(move |params, ctx| f(params, ctx).boxed()),
    })
}

#[async_trait::async_trait]
impl ServiceAction for FnAction {
    async fn invoke(&self, params: Value, ctx: ActionContext) -> Result<Value, ServiceError> {
        (self.f)(params, ctx).await
    }
}

/// Wire handler invoking one in-process action.
pub struct ActionHandler {
    name: String,
    action: Arc<dyn ServiceAction>,
}

impl ActionHandler {
    pub fn new(name: impl Into<String>, action: Arc<dyn ServiceAction>) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    /// Translate an action failure into the wire reply.
    fn reply_failure(&self, error: &ServiceError) -> WireFailure {
        let resolution = resolve_wire_status(error);
        if resolution == StatusResolution::Unmapped {
            warn!(
                "[{}] could not map '{}' to wire status",
                self.name, error.name
            );
        }
        WireFailure::from_service_error(error, resolution.status())
    }
}

#[async_trait::async_trait]
impl UnaryHandler for ActionHandler {
    async fn handle(&self, request: Value, metadata: CallMetadata) -> Result<Value, WireFailure> {
        let received_at = Utc::now();
        debug!("[{}] wire request: {}", self.name, request);

        let meta = metadata.to_map();
        debug!("[{}] wire meta: {:?}", self.name, meta);
        let ctx = ActionContext::from_metadata(&meta, received_at);

        let outcome = AssertUnwindSafe(self.action.invoke(request, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ServiceError::new(
                    kind::INTERNAL,
                    format!("Action '{}' panicked", self.name),
                    WireStatus::Internal.code(),
                ))
            });

        match outcome {
            Ok(result) => {
                debug!("[{}] sent back positive response: {}", self.name, result);
                Ok(result)
            }
            Err(error) => {
                let failure = self.reply_failure(&error);
                debug!(
                    "[{}] sent back negative response: {} ({})",
                    self.name, failure.status, failure.details
                );
                Err(failure)
            }
        }
    }
}

/// Synthesize the wire schema and handler map for a set of actions.
///
/// Both maps always have exactly the keys of `actions`.
pub fn create_service(
    service_name: &str,
    actions: &ActionMap,
    codec: &SharedCodec,
) -> (ServiceDefinition, HandlerMap) {
    let service = ServiceDefinition::unary(service_name, actions.keys().cloned(), codec);
    let handlers: HandlerMap = actions
        .iter()
        .map(|(name, action)| {
            let handler: Arc<dyn UnaryHandler> =
                Arc::new(ActionHandler::new(name.clone(), action.clone()));
            (name.clone(), handler)
        })
        .collect();
    (service, handlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::default_codec;
    use crate::metadata::{ACCESS_TOKEN_KEY, ERROR_KEY, REQUEST_ID_KEY};
    use crate::service_error::ErrorSnapshot;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn sample_actions() -> ActionMap {
        let mut actions = ActionMap::new();
        actions.insert(
            "echo".to_string(),
            action_fn(|params, _ctx| async move { Ok(params) }),
        );
        actions.insert(
            "whoami".to_string(),
            action_fn(|_params, ctx: ActionContext| async move {
                Ok(json!({ "token": ctx.meta.token, "requestId": ctx.request_id }))
            }),
        );
        actions.insert(
            "missing".to_string(),
            action_fn(|_params, _ctx| async move {
                Err(ServiceError::service_not_found("1.users.get", Some("node-2")))
            }),
        );
        actions
    }

    #[test]
    fn test_schema_and_handlers_share_keys() {
        for actions in [ActionMap::new(), sample_actions()] {
            let (service, handlers) = create_service("node", &actions, &default_codec());

            let expected: BTreeSet<&str> = actions.keys().map(String::as_str).collect();
            let schema: BTreeSet<&str> = service.method_names().collect();
            let handler_keys: BTreeSet<&str> = handlers.keys().map(String::as_str).collect();

            assert_eq!(schema, expected);
            assert_eq!(handler_keys, expected);
        }
    }

    #[test]
    fn test_schema_paths_follow_action_names() {
        let (service, _) = create_service("node", &sample_actions(), &default_codec());
        assert_eq!(service.method("echo").unwrap().path, "/echo");
        assert_eq!(service.method("whoami").unwrap().path, "/whoami");
    }

    #[tokio::test]
    async fn test_handler_passes_result_through() {
        let (_, handlers) = create_service("node", &sample_actions(), &default_codec());
        let result = handlers["echo"]
            .handle(json!({"a": [1, 2]}), CallMetadata::new())
            .await
            .unwrap();
        assert_eq!(result, json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn test_handler_builds_context_from_metadata() {
        let (_, handlers) = create_service("node", &sample_actions(), &default_codec());
        let mut metadata = CallMetadata::new();
        metadata.insert(ACCESS_TOKEN_KEY, "abc");
        metadata.insert(REQUEST_ID_KEY, "r-1");

        let result = handlers["whoami"].handle(Value::Null, metadata).await.unwrap();
        assert_eq!(result, json!({"token": "abc", "requestId": "r-1"}));
    }

    #[tokio::test]
    async fn test_handler_translates_framework_errors() {
        let (_, handlers) = create_service("node", &sample_actions(), &default_codec());
        let failure = handlers["missing"]
            .handle(json!({}), CallMetadata::new())
            .await
            .unwrap_err();

        assert_eq!(failure.status, WireStatus::Unimplemented);
        assert_eq!(failure.details, "Service '1.users.get' is not found on 'node-2' node.");
        assert!(failure.metadata.is_idempotent());

        let raw = failure.metadata.get(ERROR_KEY).unwrap();
        let snapshot: ErrorSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("ServiceNotFoundError"));
    }

    #[tokio::test]
    async fn test_handler_keeps_preassigned_wire_codes() {
        let action = action_fn(|_params, _ctx| async move {
            Err(ServiceError::new("ServiceNotFoundError", "bad input", 3))
        });
        let failure = ActionHandler::new("strict", action)
            .handle(json!({}), CallMetadata::new())
            .await
            .unwrap_err();

        assert_eq!(failure.status, WireStatus::InvalidArgument);
        assert!(!failure.metadata.is_idempotent());
    }

    #[tokio::test]
    async fn test_handler_defaults_unmapped_errors_to_unknown() {
        let action = action_fn(|_params, _ctx| async move {
            Err(ServiceError::new("ValidationError", "Parameters validation error!", 422))
        });
        let failure = ActionHandler::new("validate", action)
            .handle(json!({}), CallMetadata::new())
            .await
            .unwrap_err();

        assert_eq!(failure.status, WireStatus::Unknown);
        assert_eq!(failure.details, "Parameters validation error!");
    }

    #[tokio::test]
    async fn test_handler_replies_when_action_panics() {
        let action = action_fn(|_params, _ctx| async move {
            if true {
                panic!("boom");
            }
            Ok(Value::Null)
        });
        let failure = ActionHandler::new("explode", action)
            .handle(json!({}), CallMetadata::new())
            .await
            .unwrap_err();

        assert_eq!(failure.status, WireStatus::Internal);
    }
}
