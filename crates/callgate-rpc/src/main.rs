//! Callgate RPC - wire listener and one-shot caller.
//!
//! `serve` exposes the built-in diagnostic actions over the wire and prints
//! the bound port for the parent process. `call` issues a single redirected
//! call and prints the JSON result.

mod actions;

use anyhow::{Context, Result};
use callgate::{
    redirect_when, start_server, ActionName, CallOptions, CallRouter, CallgateError,
    InProcessCall, NodeId, ServerOptions, TcpClientFactory, WireConfig,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "callgate-rpc")]
#[command(about = "Wire listener and one-shot caller for callgate")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Expose the built-in actions (echo, ping, fail) over the wire
    Serve {
        /// Host to bind to
        #[arg(long, default_value = WireConfig::DEFAULT_BIND_HOST)]
        host: String,

        /// Port to listen on (0 = auto-assign)
        #[arg(short, long, default_value_t = WireConfig::ENDPOINT_PORT)]
        port: u16,

        /// Identity reported by `ping`
        #[arg(long, default_value = "callgate-node")]
        node_id: String,
    },

    /// Call `version.service.action` over the wire once
    Call {
        action: String,

        /// JSON params
        #[arg(long, default_value = "{}")]
        params: String,

        /// Access token to propagate
        #[arg(long)]
        token: Option<String>,

        /// Request id to propagate (random when omitted)
        #[arg(long)]
        request_id: Option<String>,

        /// Propagate this node's identity
        #[arg(long)]
        caller: bool,

        /// Identity of the calling node
        #[arg(long, default_value = "callgate-cli")]
        node_id: String,

        /// Connect here instead of resolving the service endpoint
        #[arg(long)]
        connect: Option<SocketAddr>,
    },
}

/// Stand-in for the in-process path; `call` always redirects.
struct NoLocalDispatch;

#[async_trait::async_trait]
impl InProcessCall for NoLocalDispatch {
    async fn call(
        &self,
        action: &str,
        _params: Value,
        _opts: &CallOptions,
    ) -> callgate::Result<Value> {
        Err(CallgateError::Other(format!("No in-process dispatch for '{}'", action)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the port line and call results.
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Serve {
            host,
            port,
            node_id,
        } => serve(host, port, NodeId::new(node_id)).await,
        Command::Call {
            action,
            params,
            token,
            request_id,
            caller,
            node_id,
            connect,
        } => {
            let params: Value =
                serde_json::from_str(&params).context("--params is not valid JSON")?;
            let mut opts = CallOptions::new()
                .with_request_id(request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
                .with_caller(caller);
            if let Some(token) = token {
                opts = opts.with_token(token);
            }
            call(&action, params, &opts, NodeId::new(node_id), connect).await
        }
    }
}

async fn serve(host: String, port: u16, node_id: NodeId) -> Result<()> {
    info!("Starting callgate wire server as '{}'", node_id);

    let actions = actions::builtin_actions(&node_id);
    let opts = ServerOptions::default().with_host(host).with_port(port);
    let mut handle = start_server(&actions, opts).await?;

    // Parent processes read this line to discover the bound port
    println!("WIRE_PORT={}", handle.port);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    handle.shutdown();

    Ok(())
}

async fn call(
    action: &str,
    params: Value,
    opts: &CallOptions,
    node_id: NodeId,
    connect: Option<SocketAddr>,
) -> Result<()> {
    let mut factory = TcpClientFactory::new();
    if let Some(addr) = connect {
        let endpoint = ActionName::parse(action)?.endpoint();
        info!("Routing {} to {}", endpoint, addr);
        factory = factory.with_static_route(endpoint.to_string(), addr);
    }

    let always = redirect_when(|_: &str, _: &Value, _: &CallOptions| true);
    let router = CallRouter::builder(node_id, always)
        .client_factory(factory)
        .build();

    let result = router.call(&NoLocalDispatch, action, params, opts).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
