//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! build the backend client and warm up before the first connection is
//! accepted.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::handlers::{health_handler, liveness_handler, readiness_handler, ws_upgrade_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::auth::AuthClient;
use crate::config::ServerConfig;
use crate::registry::ChannelRegistry;

/// Manages the full HTTP/WebSocket server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (channel registry, shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: Arc<ServerConfig>,
    listener: Option<TcpListener>,
    registry: Arc<ChannelRegistry>,
    auth: Arc<AuthClient>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: ServerConfig, registry: Arc<ChannelRegistry>) -> Self {
        let auth = Arc::new(AuthClient::new(
            config.auth_api_base.clone(),
            config.auth_timeout,
        ));
        Self {
            config: Arc::new(config),
            listener: None,
            registry,
            auth,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the channel registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(&self.registry)
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            registry: Arc::clone(&self.registry),
            auth: Arc::clone(&self.auth),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::clone(&self.config),
            start_time: Instant::now(),
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    /// - `GET /{token}/` -- WebSocket upgrade, one connection per peer
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = self.app_state();
        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/{token}/", get(ws_upgrade_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server. Axum's
    /// own graceful shutdown drains in-flight HTTP requests and open
    /// WebSocket connections before `serve` returns; individual channels and
    /// clients have no shutdown-specific behavior of their own (a peer
    /// disconnect and a server shutdown both unwind through `Client::listen`
    /// the same way).
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(mut self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");

        self.shutdown.set_ready();

        info!("serving WebSocket connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
            })
            .await?;

        self.shutdown.trigger_shutdown();
        self.shutdown
            .wait_for_drain(std::time::Duration::from_secs(30))
            .await;
        Ok(())
    }
}
