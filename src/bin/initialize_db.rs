use clinic_security::{
    config::AppConfig,
    repository::{PostgresRepository, RepositoryState},
    seed::SeedInitializer,
    telemetry,
};
use sqlx::postgres::PgPoolOptions;
use std::{process::ExitCode, sync::Arc};

/// initialize_db
///
/// Administrative command: applies pending schema migrations, then seeds the default menus,
/// modules, users, groups and permissions. Safe to run repeatedly.
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let config = AppConfig::load();
    telemetry::init(&config.env);

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "schema migration failed");
        return ExitCode::FAILURE;
    }

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    let seeder = SeedInitializer::new(repo, config.seed_app_label.clone());

    match seeder.run().await {
        Ok(report) => {
            if !report.permissions_seeded {
                tracing::warn!("permissions and grants were not seeded; see warning above");
            }
            tracing::info!(
                menus = report.menus_created,
                modules = report.modules_created,
                users = report.users_created,
                groups = report.groups_created,
                permissions = report.permissions_created,
                grants = report.grants_created,
                "seed summary"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            // No transaction wraps the run; re-running completes whatever was left out.
            tracing::error!(error = %e, "database initialization aborted");
            ExitCode::FAILURE
        }
    }
}
