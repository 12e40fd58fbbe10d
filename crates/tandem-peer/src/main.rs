//! tandem-peer binary.
//!
//! Usage: `tandem-peer [config.yaml]` (default `tandem.yaml`).
//!
//! Without a `gateway` section the process is a server: it accepts clients
//! at `server.path` and implements the built-in `sys` namespace. With a
//! `gateway` section it dials `client.url` as a gateway and serves one
//! browser at `gateway.path`, relaying the declared server methods.
//!
//! The config's `api` only describes the remote side: methods this process
//! would have to answer itself are skipped (see `PeerConfig::served_api`).

use std::sync::{Arc, OnceLock};

use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use tandem_core::api::{ApiSchema, Side};
use tandem_core::role::Role;
use tandem_peer::app_state::{AppState, GatewayState};
use tandem_peer::config::{self, PeerConfig};
use tandem_peer::{router, Gateway, HandlerSet, Result, RoleComposer, RpcError, Server};

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "tandem.yaml".into());
    if let Err(e) = run(&path).await {
        tracing::error!(error = %e, kind = e.kind().as_str(), "tandem-peer failed");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let role = match cfg.gateway {
        None => Role::Server,
        Some(_) => Role::Gateway,
    };
    // the sys namespace is served here, or relayed to a tandem server
    let mut api = cfg.served_api(role);
    api.merge(&sys_api());

    match role {
        Role::Gateway => run_gateway(&cfg, api).await,
        _ => run_server(&cfg, api).await,
    }
}

fn sys_api() -> ApiSchema {
    ApiSchema::new().declare("sys", Side::Server, ["ping", "peers"])
}

async fn run_server(cfg: &PeerConfig, api: ApiSchema) -> Result<()> {
    let slot: Arc<OnceLock<Server>> = Arc::new(OnceLock::new());
    let peers_slot = Arc::clone(&slot);

    let handlers = HandlerSet::new()
        .method("sys:ping", |_call| async { Ok::<_, RpcError>(json!("pong")) })
        .method("sys:peers", move |_call| {
            let slot = Arc::clone(&peers_slot);
            async move {
                let server = slot
                    .get()
                    .ok_or_else(|| RpcError::Internal("server not started".into()))?;
                Ok::<_, RpcError>(json!(server.clients()))
            }
        });

    let peer = RoleComposer::new(Role::Server, api)
        .handlers(handlers)
        .compose()?;
    let server = Server::from_config(peer, &cfg.server)?;
    let _ = slot.set(server.clone());

    let listen = cfg.server.listen_addr()?;
    let app = router::build_router(AppState::new(server.clone(), &cfg.server));

    tracing::info!(%listen, path = %cfg.server.path, "tandem server starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RpcError::Transport(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RpcError::Transport(format!("serve failed: {e}")))?;

    server.shutdown().await;
    Ok(())
}

async fn run_gateway(cfg: &PeerConfig, api: ApiSchema) -> Result<()> {
    let client_cfg = cfg
        .client
        .as_ref()
        .ok_or_else(|| RpcError::Config("gateway mode requires a client section".into()))?;
    let gateway_cfg = cfg
        .gateway
        .as_ref()
        .ok_or_else(|| RpcError::Config("gateway section missing".into()))?;

    let peer = RoleComposer::new(Role::Gateway, api).compose()?;
    let gateway = Gateway::connect(peer, client_cfg)?;

    let listen = gateway_cfg.listen_addr()?;
    let app = router::build_gateway_router(GatewayState::new(
        gateway.clone(),
        gateway_cfg,
        &cfg.server,
    ));

    tracing::info!(%listen, upstream = %client_cfg.url, "tandem gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RpcError::Transport(format!("bind {listen} failed: {e}")))?;

    let closed = {
        let gateway = gateway.clone();
        async move { gateway.closed().await }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = closed => tracing::info!("upstream connection closed"),
            }
        })
        .await
        .map_err(|e| RpcError::Transport(format!("serve failed: {e}")))?;

    gateway.quit().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
