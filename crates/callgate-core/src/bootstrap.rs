//! Wire server bootstrap for a set of in-process actions.

use crate::adapter::{create_service, ActionMap};
use crate::codec::{default_codec, SharedCodec};
use crate::config::WireConfig;
use crate::wire::{ServerCredentials, WireServer, WireServerHandle};
use crate::Result;
use tracing::info;

/// Options for [`start_server`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    pub service_name: String,
    pub codec: SharedCodec,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: WireConfig::DEFAULT_BIND_HOST.to_string(),
            port: 0,
            service_name: "callgate".to_string(),
            codec: default_codec(),
        }
    }
}

impl ServerOptions {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Expose `actions` over the wire and start accepting connections.
///
/// The returned handle reports the port actually bound, which differs from
/// the requested one when `0` was asked for.
pub async fn start_server(actions: &ActionMap, opts: ServerOptions) -> Result<WireServerHandle> {
    let (service, handlers) = create_service(&opts.service_name, actions, &opts.codec);

    let mut server = WireServer::new();
    server.add_service(service, handlers)?;

    let handle = server
        .bind((opts.host.as_str(), opts.port), ServerCredentials::Insecure)
        .await?;

    info!("Started wire server on :{}", handle.port);
    info!("Server listening for {}", handle.methods().join(", "));
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::action_fn;
    use serde_json::Value;

    #[tokio::test]
    async fn test_start_server_reports_bound_port() {
        let mut actions = ActionMap::new();
        actions.insert(
            "ping".to_string(),
            action_fn(|_params, _ctx| async move { Ok(Value::from("pong")) }),
        );

        let mut handle = start_server(&actions, ServerOptions::default().with_host("127.0.0.1"))
            .await
            .unwrap();

        assert!(handle.port > 0);
        assert_eq!(handle.methods(), ["ping".to_string()]);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_start_server_with_no_actions() {
        let opts = ServerOptions::default().with_host("127.0.0.1");
        let mut handle = start_server(&ActionMap::new(), opts).await.unwrap();
        assert!(handle.methods().is_empty());
        handle.shutdown();
    }
}
