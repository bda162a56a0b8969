use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use relay_db::Database;
use relay_gateway::{Gateway, connection};

/// Server settings, read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("RELAY_HOST").unwrap_or_else(|_| "localhost".into());
        let port: u16 = std::env::var("RELAY_PORT")
            .unwrap_or_else(|_| "8765".into())
            .parse()?;
        let db_path: PathBuf = std::env::var("RELAY_DB_PATH")
            .unwrap_or_else(|_| "chat.db".into())
            .into();

        Ok(Self {
            host,
            port,
            db_path,
        })
    }
}

/// WebSocket endpoint. Clients connect to `/`.
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn ws_upgrade(State(gateway): State<Gateway>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}

/// Serve on an already bound listener until `shutdown` resolves. On
/// shutdown every live session is dropped, which closes its socket.
pub async fn serve<F>(listener: tokio::net::TcpListener, gateway: Gateway, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = gateway.registry.clone();
    let app = router(gateway);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let closed = registry.close_all().await;
            info!("Closed {} live sessions", closed);
        })
        .await?;

    Ok(())
}

/// Bind `host:port` and relay chat until Ctrl+C / SIGTERM. Owns the store
/// for the server's lifetime; the last handle is released when this returns.
pub async fn run(host: &str, port: u16, store: Database) -> anyhow::Result<()> {
    let gateway = Gateway::new(Arc::new(store));

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("Chat relay listening on ws://{}", addr);

    serve(listener, gateway, shutdown_signal()).await?;

    info!("Chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        // Single test touching the environment, so no cross-test races
        unsafe {
            std::env::remove_var("RELAY_HOST");
            std::env::remove_var("RELAY_PORT");
            std::env::remove_var("RELAY_DB_PATH");
        }
        assert_eq!(
            Config::from_env().unwrap(),
            Config {
                host: "localhost".into(),
                port: 8765,
                db_path: "chat.db".into(),
            }
        );

        unsafe {
            std::env::set_var("RELAY_HOST", "0.0.0.0");
            std::env::set_var("RELAY_PORT", "9000");
            std::env::set_var("RELAY_DB_PATH", "/tmp/relay.db");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.db_path, PathBuf::from("/tmp/relay.db"));

        unsafe {
            std::env::set_var("RELAY_PORT", "not-a-port");
        }
        assert!(Config::from_env().is_err());

        unsafe {
            std::env::remove_var("RELAY_HOST");
            std::env::remove_var("RELAY_PORT");
            std::env::remove_var("RELAY_DB_PATH");
        }
    }
}
