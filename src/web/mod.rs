//! The web surface: one HTML page, one upload endpoint, one health probe.
//!
//! ```text
//! GET  /             upload page (embedded HTML + JS)
//! POST /api/analyze  multipart `file` → text/event-stream
//! GET  /health       {"status":"ok","model":...}
//! ```
//!
//! `POST /api/analyze` answers immediately with a Server-Sent Events stream.
//! The orchestrator runs in its own task and reports through a
//! [`ChannelDisplay`](crate::display::ChannelDisplay); each display event
//! becomes one SSE event:
//!
//! | event     | data                                        |
//! |-----------|---------------------------------------------|
//! | `status`  | `{"event":"started","filename":...}`        |
//! | `success` | `{"event":"success","message":...}`         |
//! | `error`   | `{"event":"error","message":...}`           |
//! | `render`  | `{"event":"render","fragment":...}`         |
//! | `done`    | `{"event":"finished"}`                      |
//!
//! The page appends each `render` fragment to its own copy of the answer.
//!
//! If the browser goes away the task is aborted; dropping it deletes the
//! staged upload.

mod routes;

use crate::analyst::InvoiceAnalyst;
use crate::chat::ChatClient;
use crate::config::ServerConfig;
use crate::converter::DocumentConverter;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use routes::sse_event;

/// The orchestrator with its collaborators type-erased, as shared by every
/// request.
pub type SharedAnalyst = InvoiceAnalyst<Arc<dyn DocumentConverter>, Arc<dyn ChatClient>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) analyst: Arc<SharedAnalyst>,
    pub(crate) model: Arc<str>,
}

/// HTTP server for the upload page.
pub struct InvoiceServer {
    config: ServerConfig,
    state: AppState,
}

impl InvoiceServer {
    /// `model` is only reported by `/health`.
    pub fn new(analyst: SharedAnalyst, model: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            config,
            state: AppState {
                analyst: Arc::new(analyst),
                model: Arc::from(model.into()),
            },
        }
    }

    /// Build the router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(routes::index))
            .route("/health", get(routes::health))
            .route(
                "/api/analyze",
                post(routes::analyze).layer(DefaultBodyLimit::max(self.config.max_upload_bytes())),
            )
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(self) -> std::io::Result<()> {
        let addr: SocketAddr = self.address().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid address '{}': {}", self.address(), e),
            )
        })?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Serving invoice analysis on http://{}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }
}
