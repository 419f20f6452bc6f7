//! HTTP surface.
//!
//! | Route | Body | Success |
//! |-------|------|---------|
//! | `POST /analyze-work` | `{image, problemContext?}` | `FeedbackResult` |
//! | `POST /extract-questions` | multipart `file` (or `image`) | `[Question]` |
//! | `POST /analyze-file` | `{fileName, problemContext?}` | `FeedbackResult` |
//! | `GET /health` | | `{status, ocr}` |
//!
//! Every route is also mounted under [`ServerConfig::route_prefix_alias`]
//! (default `/api`), which is where the browser front-end calls them.

pub mod error;
pub mod handlers;

pub use error::{ApiError, ErrorKind};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::tutor::Tutor;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub tutor: Arc<Tutor>,
}

impl AppState {
    pub fn new(tutor: Tutor) -> Self {
        Self {
            tutor: Arc::new(tutor),
        }
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze-work", post(handlers::analyze_work))
        .route("/extract-questions", post(handlers::extract_questions))
        .route("/analyze-file", post(handlers::analyze_file))
        .route("/health", get(handlers::health))
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let mut app = routes();
    if let Some(prefix) = &config.route_prefix_alias {
        app = app.nest(prefix, routes());
    }

    let app = app
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());
    let app = if config.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };
    app.with_state(state)
}

/// Bind `config.bind_addr` and serve until `shutdown` resolves.
pub async fn serve<F>(
    state: AppState,
    config: &ServerConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(state, config);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
