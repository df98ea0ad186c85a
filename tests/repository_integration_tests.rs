//! Postgres-backed checks. They need a reachable `DATABASE_URL` and are ignored by default:
//! `cargo test -- --ignored`.

use axum::http::Method;
use clinic_security::{
    MenuResolver, Principal, SeedInitializer, SessionState,
    menu::MenuQuery,
    models::User,
    repository::{PostgresRepository, Repository, RepositoryState},
};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::test;

// --- Test Context and Setup ---

/// Holds the pool of the database under test, migrated and seeded.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        let context = DbTestContext { pool };
        SeedInitializer::new(context.repository(), "doctor")
            .run()
            .await
            .expect("Seeding the test database should succeed.");
        context
    }

    fn repository(&self) -> RepositoryState {
        Arc::new(PostgresRepository::new(self.pool.clone()))
    }
}

async fn find_user(repo: &RepositoryState, username: &str) -> User {
    repo.find_user_by_username(username)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("seeded user '{}' should already exist", username))
}

// --- Tests ---

#[test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_seed_is_idempotent_against_postgres() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let before = repo.row_counts().await.unwrap();
    let report = SeedInitializer::new(repo.clone(), "doctor").run().await.unwrap();
    let after = repo.row_counts().await.unwrap();

    assert_eq!(before, after);
    assert_eq!(report.menus_created, 0);
    assert_eq!(report.grants_created, 0);
    assert!(report.permissions_seeded);
}

#[test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_group_grants_follow_menu_then_module_order() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let doctor = find_user(&repo, "drgomez").await;
    let groups = repo.user_groups(doctor.id).await.unwrap();
    assert_eq!(groups.first().map(|g| g.name.as_str()), Some("Médicos"));

    let grants = repo.active_group_grants(groups[0].id).await.unwrap();
    let urls: Vec<&str> = grants.iter().map(|g| g.module.url.as_str()).collect();
    assert_eq!(urls, vec!["pacientes/", "diagnosticos/"]);

    let grant_ids: Vec<i64> = grants.iter().map(|g| g.grant_id).collect();
    let owned = repo.grant_permissions(&grant_ids).await.unwrap();
    assert_eq!(owned.len(), 7);
    assert!(repo.grant_permissions(&[]).await.unwrap().is_empty());
}

#[test]
#[serial]
#[ignore = "requires DATABASE_URL"]
async fn test_resolver_renders_doctor_menu_from_postgres() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let doctor = find_user(&repo, "drgomez").await;

    let resolver = MenuResolver::new(repo);
    let mut session = SessionState::default();
    let context = resolver
        .resolve(
            &Principal::Authenticated(doctor),
            &mut session,
            &MenuQuery::default(),
            &Method::GET,
        )
        .await;

    assert!(context.menu_error.is_none());
    assert!(session.group_id.is_some());
    let menus: Vec<String> = context
        .menu_list
        .unwrap_or_default()
        .into_iter()
        .map(|entry| entry.menu.name)
        .collect();
    assert_eq!(menus, vec!["Pacientes", "Consultas"]);
}
