//! Built-in diagnostic actions exposed by `callgate-rpc serve`.

use callgate::{action_fn, ActionContext, ActionMap, NodeId, ServiceError};
use chrono::Utc;
use serde_json::{json, Value};

/// `echo` returns its params, `ping` reports who answered and what it saw,
/// `fail` raises the error described by its params.
pub fn builtin_actions(node_id: &NodeId) -> ActionMap {
    let mut actions = ActionMap::new();

    actions.insert(
        "echo".to_string(),
        action_fn(|params, _ctx| async move { Ok(params) }),
    );

    let node = node_id.clone();
    actions.insert(
        "ping".to_string(),
        action_fn(move |_params, ctx: ActionContext| {
            let node = node.clone();
            async move {
                let handler_ms = (Utc::now() - ctx.meta.request_start_time).num_milliseconds();
                Ok(json!({
                    "nodeID": node.as_str(),
                    "requestID": ctx.request_id,
                    "callerNodeID": ctx.caller_node_id,
                    "authenticated": ctx.meta.token.is_some(),
                    "handlerMs": handler_ms,
                }))
            }
        }),
    );

    let node = node_id.clone();
    actions.insert(
        "fail".to_string(),
        action_fn(move |params, _ctx| {
            let node = node.clone();
            async move { Err(requested_failure(&params, &node)) }
        }),
    );

    actions
}

/// Build the error a `fail` call asked for.
///
/// With no `name`, replies as if the requested `action` did not exist here.
fn requested_failure(params: &Value, node: &NodeId) -> ServiceError {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("fail");
        return ServiceError::service_not_found(action, Some(node.as_str()));
    };

    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Requested failure");
    let code = params
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .unwrap_or(500);

    ServiceError::new(name, message, code)
        .with_retryable(params.get("retryable").and_then(Value::as_bool).unwrap_or(false))
        .with_data(params.get("data").cloned().unwrap_or(Value::Null))
}
