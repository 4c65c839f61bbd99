//! End-to-end tests: outbound router -> wire -> inbound adapter.
//!
//! These tests start a real wire server on a local port and point the
//! fixed-name endpoint `users-1:5000` at it with a static route.

use callgate::status::WireStatus;
use callgate::{
    action_fn, start_server, ActionContext, ActionMap, AllowList, CallOptions, CallRouter,
    CallgateError, InProcessCall, NodeId, ServerOptions, ServiceError, TcpClientFactory,
    WireConfig, WireServerHandle,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Original call path that must never be reached by redirected calls.
#[derive(Default)]
struct LocalBroker {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl InProcessCall for LocalBroker {
    async fn call(
        &self,
        action: &str,
        _params: Value,
        _opts: &CallOptions,
    ) -> callgate::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "handledLocally": action }))
    }
}

fn users_actions() -> ActionMap {
    let mut actions = ActionMap::new();
    actions.insert(
        "getProfile".to_string(),
        action_fn(|params, ctx: ActionContext| async move {
            Ok(json!({
                "id": params["id"],
                "token": ctx.meta.token,
                "requestId": ctx.request_id,
                "caller": ctx.caller_node_id,
            }))
        }),
    );
    actions.insert(
        "lookup".to_string(),
        action_fn(|params, _ctx| async move {
            let action = params["action"].as_str().unwrap_or("1.unknown.action").to_string();
            Err(ServiceError::service_not_found(&action, None))
        }),
    );
    actions.insert(
        "strict".to_string(),
        action_fn(|_params, _ctx| async move {
            Err(ServiceError::new(
                "BadRequestError",
                "id must be positive",
                WireStatus::InvalidArgument.code(),
            ))
        }),
    );
    actions.insert(
        "rejectBlob".to_string(),
        action_fn(|_params, _ctx| async move {
            Err(ServiceError::new("ValidationError", "bad", 422)
                .with_data(json!({"blob": "x".repeat(70_000)}))
                .with_retryable(true))
        }),
    );
    actions.insert(
        "exportAll".to_string(),
        action_fn(|_params, _ctx| async move {
            Ok(Value::String("x".repeat(WireConfig::MAX_FRAME_SIZE + 1)))
        }),
    );
    actions.insert(
        "busy".to_string(),
        action_fn(|_params, _ctx| async move {
            Err(ServiceError::queue_is_full("1.users.busy", "node-remote", 100, 100))
        }),
    );
    actions
}

async fn start_users_server() -> WireServerHandle {
    start_server(
        &users_actions(),
        ServerOptions::default().with_host("127.0.0.1"),
    )
    .await
    .expect("server should start")
}

fn router_for(handle: &WireServerHandle) -> CallRouter {
    CallRouter::builder(
        NodeId::new("node-local"),
        AllowList::new().allow_service("1.users"),
    )
    .client_factory(TcpClientFactory::new().with_static_route("users-1:5000", handle.addr()))
    .build()
}

#[tokio::test]
async fn test_redirected_call_round_trip_with_metadata() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);
    let broker = LocalBroker::default();
    let opts = CallOptions::new()
        .with_token("abc")
        .with_request_id("r-1")
        .with_caller(true);

    let result = router
        .call(&broker, "1.users.getProfile", json!({"id": 7}), &opts)
        .await
        .unwrap();

    assert_eq!(
        result,
        json!({"id": 7, "token": "abc", "requestId": "r-1", "caller": "node-local"})
    );
    assert_eq!(broker.calls.load(Ordering::SeqCst), 0);
    handle.shutdown();
}

#[tokio::test]
async fn test_declined_call_stays_in_process() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);
    let broker = LocalBroker::default();

    let result = router
        .call(&broker, "1.posts.list", json!({}), &CallOptions::new())
        .await
        .unwrap();

    assert_eq!(result, json!({"handledLocally": "1.posts.list"}));
    assert_eq!(broker.calls.load(Ordering::SeqCst), 1);
    handle.shutdown();
}

#[tokio::test]
async fn test_service_not_found_is_replied_as_unimplemented() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(
            &LocalBroker::default(),
            "1.users.lookup",
            json!({"action": "2.billing.charge"}),
            &CallOptions::new(),
        )
        .await
        .unwrap_err();

    let CallgateError::Remote(failure) = err else {
        panic!("Expected a remote failure");
    };
    assert_eq!(failure.status, WireStatus::Unimplemented);
    assert_eq!(failure.details, "Service '2.billing.charge' is not found.");

    let snapshot = failure.error_snapshot().expect("error snapshot attached");
    assert_eq!(snapshot.name.as_deref(), Some("ServiceNotFoundError"));
    assert_eq!(snapshot.data, Some(json!({"action": "2.billing.charge", "nodeID": null})));
    handle.shutdown();
}

#[tokio::test]
async fn test_preassigned_low_code_is_replied_unchanged() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(&LocalBroker::default(), "1.users.strict", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.wire_status(), Some(WireStatus::InvalidArgument));
    assert!(!err.is_retryable());
    handle.shutdown();
}

#[tokio::test]
async fn test_overload_is_unavailable_and_retryable() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(&LocalBroker::default(), "1.users.busy", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.wire_status(), Some(WireStatus::Unavailable));
    assert!(err.is_retryable());
    handle.shutdown();
}

#[tokio::test]
async fn test_failure_with_large_error_data_still_reaches_caller() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(&LocalBroker::default(), "1.users.rejectBlob", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    let CallgateError::Remote(failure) = err else {
        panic!("Expected a remote failure");
    };
    assert_eq!(failure.status, WireStatus::Unknown);
    assert_eq!(failure.details, "bad");
    assert!(failure.metadata.is_idempotent());

    let snapshot = failure.error_snapshot().expect("snapshot kept without its data");
    assert_eq!(snapshot.name.as_deref(), Some("ValidationError"));
    assert_eq!(snapshot.data, None);
    handle.shutdown();
}

#[tokio::test]
async fn test_oversized_result_is_a_non_retryable_failure() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(&LocalBroker::default(), "1.users.exportAll", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.wire_status(), Some(WireStatus::ResourceExhausted));
    assert!(!err.is_retryable());

    // The server keeps answering afterwards.
    let result = router
        .call(&LocalBroker::default(), "1.users.getProfile", json!({"id": 1}), &CallOptions::new())
        .await
        .unwrap();
    assert_eq!(result["id"], 1);
    handle.shutdown();
}

#[tokio::test]
async fn test_unknown_remote_action_is_unimplemented() {
    let mut handle = start_users_server().await;
    let router = router_for(&handle);

    let err = router
        .call(&LocalBroker::default(), "1.users.deleteEverything", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.wire_status(), Some(WireStatus::Unimplemented));
    handle.shutdown();
}

#[tokio::test]
async fn test_remote_failure_relays_through_a_second_hop() {
    // node-b exposes an action that itself calls node-a's users service.
    let mut users = start_users_server().await;
    let router = Arc::new(router_for(&users));

    let mut gateway_actions = ActionMap::new();
    let hop_router = router.clone();
    gateway_actions.insert(
        "relay".to_string(),
        action_fn(move |params, _ctx| {
            let router = hop_router.clone();
            async move {
                let result = router
                    .call(&LocalBroker::default(), "1.users.lookup", params, &CallOptions::new())
                    .await?;
                Ok(result)
            }
        }),
    );
    let mut gateway = start_server(
        &gateway_actions,
        ServerOptions::default().with_host("127.0.0.1"),
    )
    .await
    .unwrap();

    let gateway_router = CallRouter::builder(
        NodeId::new("node-edge"),
        AllowList::new().allow_service("1.gateway"),
    )
    .client_factory(TcpClientFactory::new().with_static_route("gateway-1:5000", gateway.addr()))
    .build();

    let err = gateway_router
        .call(
            &LocalBroker::default(),
            "1.gateway.relay",
            json!({"action": "3.search.query"}),
            &CallOptions::new(),
        )
        .await
        .unwrap_err();

    let CallgateError::Remote(failure) = err else {
        panic!("Expected a remote failure");
    };
    // The first hop's UNIMPLEMENTED is carried as a low code and kept as is.
    assert_eq!(failure.status, WireStatus::Unimplemented);
    assert_eq!(
        failure.error_snapshot().unwrap().name.as_deref(),
        Some("ServiceNotFoundError")
    );

    gateway.shutdown();
    users.shutdown();
}

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let mut handle = start_users_server().await;
    let router = Arc::new(router_for(&handle));

    let mut tasks = Vec::new();
    for id in 0..16 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            let opts = CallOptions::new().with_request_id(format!("r-{}", id));
            router
                .call(&LocalBroker::default(), "1.users.getProfile", json!({"id": id}), &opts)
                .await
        }));
    }

    for (id, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result["id"], json!(id));
        assert_eq!(result["requestId"], json!(format!("r-{}", id)));
    }
    handle.shutdown();
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_connect_error() {
    let router = CallRouter::builder(
        NodeId::new("node-local"),
        AllowList::new().allow_service("1.users"),
    )
    .client_factory(
        TcpClientFactory::new().with_static_route("users-1:5000", "127.0.0.1:1".parse().unwrap()),
    )
    .build();
    let broker = LocalBroker::default();

    let err = router
        .call(&broker, "1.users.getProfile", json!({}), &CallOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallgateError::Connect { .. }));
    assert_eq!(broker.calls.load(Ordering::SeqCst), 0);
}
