//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use ldap_exporter_core::{CONTENT_TYPE, Exporter, render};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    exporter: Arc<Exporter>,
    metrics_path: Arc<str>,
}

/// Create the HTTP router.
fn create_router(exporter: Arc<Exporter>, metrics_path: &str) -> Router {
    let state = AppState {
        exporter,
        metrics_path: Arc::from(metrics_path),
    };

    let router = Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler));

    // A metrics path of "/" replaces the landing page.
    let router = if metrics_path == "/" {
        router
    } else {
        router.route("/", get(index_handler))
    };

    router.layer(CorsLayer::permissive()).with_state(state)
}

/// Handler for the metrics endpoint. Every request runs one scrape.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let samples = state.exporter.collect().await;
    debug!(samples = samples.len(), "Serving scrape");

    (
        StatusCode::OK,
        [("content-type", CONTENT_TYPE)],
        render(&samples),
    )
        .into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>LDAP Exporter</title></head>\n<body>\n<h1>LDAP Exporter</h1>\n<p><a href=\"{path}\">Metrics</a></p>\n</body>\n</html>\n",
        path = state.metrics_path
    ))
}

/// HTTP server configuration.
pub struct HttpServer {
    exporter: Arc<Exporter>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(exporter: Arc<Exporter>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            exporter,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = create_router(self.exporter, &self.metrics_path);

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
