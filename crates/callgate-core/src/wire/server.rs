//! Generic unary wire server.
//!
//! Listens on a TCP address, accepts connections and dispatches each framed
//! request to the handler registered for its method path.
//!
//! # Thread Safety
//!
//! The server runs on the tokio runtime. Each connection is handled in its
//! own spawned task; within a connection requests are served one at a time.
//! The routing table is immutable once the server is bound and is shared via
//! `Arc`.

use super::protocol::{
    decode_envelope, encode_envelope, is_oversized, read_frame, write_frame, RequestHead,
    ResponseHead, FRAME_FIELD, HEAD_FIELD,
};
use super::schema::{MethodDescriptor, ServiceDefinition};
use super::ServerCredentials;
use crate::config::WireConfig;
use crate::metadata::CallMetadata;
use crate::status::{WireFailure, WireStatus};
use crate::{CallgateError, Result};
use bytes::Bytes;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handles one unary method.
#[async_trait::async_trait]
pub trait UnaryHandler: Send + Sync + 'static {
    /// Handle a decoded request. A failure is replied to with its status,
    /// details and metadata.
    async fn handle(
        &self,
        request: Value,
        metadata: CallMetadata,
    ) -> std::result::Result<Value, WireFailure>;
}

/// Handlers keyed by method name.
pub type HandlerMap = BTreeMap<String, Arc<dyn UnaryHandler>>;

struct Route {
    method: MethodDescriptor,
    handler: Arc<dyn UnaryHandler>,
}

/// Handle to a running wire server. Dropping shuts down the server.
pub struct WireServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    methods: Vec<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WireServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Names of every method the server exposes.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Shut down the server gracefully.
    ///
    /// Stops accepting new connections and signals all active connection
    /// handlers to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for WireServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Unary wire server builder.
#[derive(Default)]
pub struct WireServer {
    routes: HashMap<String, Route>,
}

impl WireServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service together with its handlers.
    ///
    /// The schema and the handler map must name exactly the same methods, and
    /// no path may already be registered.
    pub fn add_service(
        &mut self,
        service: ServiceDefinition,
        mut handlers: HandlerMap,
    ) -> Result<()> {
        let schema_keys: BTreeSet<&str> = service.method_names().collect();
        let handler_keys: BTreeSet<&str> = handlers.keys().map(String::as_str).collect();
        if schema_keys != handler_keys {
            return Err(CallgateError::Validation {
                field: "service".to_string(),
                message: format!(
                    "schema methods {:?} do not match handlers {:?} for service '{}'",
                    schema_keys, handler_keys, service.name
                ),
            });
        }

        if let Some(taken) = service.methods().find(|m| self.routes.contains_key(&m.path)) {
            return Err(CallgateError::Validation {
                field: "service".to_string(),
                message: format!("path '{}' is already registered", taken.path),
            });
        }

        for method in service.methods() {
            if let Some(handler) = handlers.remove(&method.name) {
                self.routes.insert(
                    method.path.clone(),
                    Route {
                        method: method.clone(),
                        handler,
                    },
                );
            }
        }
        Ok(())
    }

    /// Names of every registered method, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.values().map(|r| r.method.name.clone()).collect();
        names.sort();
        names
    }

    /// Bind to `addr` and start serving in background tokio tasks.
    ///
    /// Port `0` asks the OS for any free port; the handle reports the port
    /// actually bound.
    pub async fn bind<A: ToSocketAddrs>(
        self,
        addr: A,
        _credentials: ServerCredentials,
    ) -> Result<WireServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let methods = self.method_names();

        info!("Wire server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            Arc::new(self.routes),
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok(WireServerHandle {
            addr: local_addr,
            port: local_addr.port(),
            methods,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        routes: Arc<HashMap<String, Route>>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Wire server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= WireConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting wire connection from {}: at max capacity ({})",
                                    peer_addr,
                                    WireConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let routes = routes.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Wire connection from {}", peer_addr);
                                let served =
                                    Self::handle_connection(stream, &routes, &mut conn_shutdown)
                                        .await;
                                if let Err(e) = served {
                                    debug!("Wire connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Wire accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        routes: &HashMap<String, Route>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()),
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_request(frame, routes).await?;
            write_frame(&mut writer, &response).await?;
        }
    }

    async fn process_request(frame: Bytes, routes: &HashMap<String, Route>) -> Result<Bytes> {
        let (head, body): (RequestHead, Bytes) = match decode_envelope(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                return failure_envelope(WireStatus::Internal, format!("Malformed request: {}", e));
            }
        };

        let Some(route) = routes.get(&head.path) else {
            return failure_envelope(
                WireStatus::Unimplemented,
                format!("Method '{}' is not implemented", head.path),
            );
        };

        let request = match route.method.codec.decode(&body) {
            Ok(value) => value,
            Err(e) => {
                return failure_envelope(
                    WireStatus::Internal,
                    format!("Failed to deserialize request for '{}': {}", head.path, e),
                );
            }
        };

        match route.handler.handle(request, head.metadata).await {
            Ok(result) => {
                let bytes = match route.method.codec.encode(&result) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        return failure_envelope(
                            WireStatus::Internal,
                            format!("Failed to serialize response for '{}': {}", head.path, e),
                        );
                    }
                };
                match encode_envelope(&ResponseHead::ok(), &bytes) {
                    Err(e) if is_oversized(&e, FRAME_FIELD) => failure_envelope(
                        WireStatus::ResourceExhausted,
                        format!("Response for '{}' is too large: {}", head.path, e),
                    ),
                    other => other,
                }
            }
            Err(failure) => failure_reply(&head.path, failure),
        }
    }
}

fn failure_envelope(status: WireStatus, details: String) -> Result<Bytes> {
    debug!("Replying {} without a handler result: {}", status, details);
    encode_envelope(&ResponseHead::failed(status, details, CallMetadata::new()), &[])
}

/// Encode a handler failure, shrinking it until its head fits.
fn failure_reply(path: &str, failure: WireFailure) -> Result<Bytes> {
    let mut reply = failure;
    loop {
        let head =
            ResponseHead::failed(reply.status, reply.details.clone(), reply.metadata.clone());
        match encode_envelope(&head, &[]) {
            Err(e) if is_oversized(&e, HEAD_FIELD) => match reply.reduced() {
                Some(smaller) => {
                    warn!("Failure reply for '{}' too large, shrinking: {}", path, e);
                    reply = smaller;
                }
                None => return Err(e),
            },
            other => return other,
        }
    }
}
