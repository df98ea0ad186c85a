use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tower_sessions::{MemoryStore, SessionManagerLayer};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain: navigation resolution and default data.
pub mod menu;
pub mod seed;

// Persistence, identity and shared types.
pub mod auth;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

// HTTP surface and process setup.
pub mod handlers;
pub mod routes;
pub mod telemetry;

use routes::public;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use memory::InMemoryRepository;
pub use menu::{MenuResolver, Principal, ResolvedContext, SessionState};
pub use repository::{PostgresRepository, RepositoryState};
pub use seed::{SeedInitializer, SeedReport};

/// ApiDoc
///
/// Aggregates the documented paths and schemas into the OpenAPI document served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(handlers::menu_context),
    components(
        schemas(
            menu::ResolvedContext, menu::MenuEntry, menu::ModulePermissions,
            models::User, models::Group, models::Menu, models::Module, models::Permission,
        )
    ),
    tags(
        (name = "clinic-security", description = "Clinic navigation and permissions API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container holding every service a request may need.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: abstracts the persistent store.
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, the session layer and the observability stack, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Sessions hold the active group between requests. Cookies are only marked `Secure`
    // in production so local HTTP development keeps working.
    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(state.config.env == config::Env::Production);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .with_state(state);

    base_router
        .layer(sessions)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span, correlating every log line with the `x-request-id` header.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
