use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{any, get},
};

/// Public Router Module
///
/// Endpoints reachable without credentials.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // ANY /menu?gpid=...
        // Every method is routed so that non-GET requests still receive the base context
        // (user and timestamps) without any menu computation.
        .route("/menu", any(handlers::menu_context))
}
