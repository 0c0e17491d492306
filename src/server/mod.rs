//! HTTP surface: router, shared state and CORS.

pub mod error;
pub mod handlers;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ToolsConfig;
use crate::pipeline::ClipPipeline;
use crate::scheduler::CleanupScheduler;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClipPipeline>,
    pub scheduler: CleanupScheduler,
    pub tools: Arc<ToolsConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<ClipPipeline>, scheduler: CleanupScheduler, tools: ToolsConfig) -> Self {
        Self {
            pipeline,
            scheduler,
            tools: Arc::new(tools),
        }
    }
}

/// Build the application router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/clip", get(handlers::clip))
        .route("/voice", get(handlers::voice))
        .route("/cleanup", get(handlers::cleanup))
        .route("/status", get(handlers::status))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}
