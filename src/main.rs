use clinic_security::{
    AppState,
    config::AppConfig,
    create_router,
    repository::{PostgresRepository, RepositoryState},
    telemetry,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;

/// main
///
/// Entry point for the HTTP server: configuration, logging, database and router startup.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging
    telemetry::init(&config.env);
    tracing::info!("Application starting in {:?} mode", config.env);
    if config.header_bypass_enabled() {
        tracing::warn!("x-user-id header bypass is active; set APP_ENV=production to disable it");
    }

    // 3. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Router and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState { repo, config });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
