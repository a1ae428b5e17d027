//! HTTP/WebSocket server for the meter view

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::{MeterConfig, UiConfig};
use crate::protocol::ControlMessage;
use crate::session::SessionHandle;
use crate::telemetry::TelemetryStore;
use crate::ui::handlers;
use crate::ui::websocket;

/// Shared application state
pub struct AppState {
    pub session: SessionHandle,
    pub store: Arc<TelemetryStore>,
    pub meter: MeterConfig,
    /// Messages for every connected client (status changes)
    pub control_tx: broadcast::Sender<ControlMessage>,
}

impl AppState {
    pub fn new(session: SessionHandle, meter: MeterConfig) -> Self {
        let (control_tx, _) = broadcast::channel(256);
        let store = session.store().clone();
        Self {
            session,
            store,
            meter,
            control_tx,
        }
    }

    pub fn subscribe_control(&self) -> broadcast::Receiver<ControlMessage> {
        self.control_tx.subscribe()
    }

    /// Push the current monitoring status to every client
    pub async fn broadcast_status(&self) {
        match self.session.status().await {
            Ok(status) => {
                let _ = self.control_tx.send(ControlMessage::Status(status));
            }
            Err(e) => tracing::warn!("Cannot broadcast status: {}", e),
        }
    }
}

/// Web server for the meter view
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: UiConfig, session: SessionHandle, meter: MeterConfig) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(session, meter)),
        }
    }

    /// Get shared state
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            // API routes
            .route("/api/levels", get(handlers::get_levels))
            .route("/api/master", get(handlers::get_master))
            .route(
                "/api/channels/:id",
                get(handlers::get_channel).delete(handlers::delete_channel),
            )
            .route("/api/monitoring", get(handlers::get_monitoring))
            .route("/api/monitoring/enable", post(handlers::enable_monitoring))
            .route("/api/monitoring/disable", post(handlers::disable_monitoring))
            // WebSocket
            .route("/ws", get(websocket::websocket_handler))
            // Health check
            .route("/health", get(|| async { "OK" }));

        if let Some(static_dir) = &self.config.static_dir {
            router = router.fallback_service(ServeDir::new(static_dir));
        }

        let router = router.with_state(self.state.clone());
        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router.layer(cors)
        } else {
            router
        }
    }

    /// Start the web server
    pub async fn start(&self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.http_port).parse()?;

        let router = self.build_router();

        tracing::info!("Web server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }

    /// Start the web server in the background
    pub fn start_background(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.start().await })
    }
}
