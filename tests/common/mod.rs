#![allow(dead_code)]

use clinic_security::{
    AppConfig, AppState, InMemoryRepository, SeedInitializer,
    models::{Group, NewUser, User},
    repository::{Repository, RepositoryState},
};
use std::sync::Arc;

// --- Shared Fixtures ---

/// A store holding the full default catalog, with the doctor content types registered.
pub async fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.register_content_type("doctor", "patient").await;
    repo.register_content_type("doctor", "diagnosis").await;

    SeedInitializer::new(repo.clone() as RepositoryState, "doctor")
        .run()
        .await
        .expect("seeding the in-memory store should succeed");
    repo
}

pub fn state_for(repo: Arc<InMemoryRepository>, config: AppConfig) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        config,
    }
}

/// Returns the existing group with this name (get-or-create never duplicates).
pub async fn group(repo: &InMemoryRepository, name: &str) -> Group {
    repo.get_or_create_group(name).await.unwrap().0
}

/// Returns the existing seeded user with this username.
pub async fn user(repo: &InMemoryRepository, username: &str) -> User {
    repo.find_user_by_username(username)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("expected seeded user '{}' to exist", username))
}

pub async fn superuser(repo: &InMemoryRepository) -> User {
    let admin = NewUser {
        username: "admin".to_string(),
        email: "admin@clinica.med".to_string(),
        is_staff: true,
        is_superuser: true,
        ..NewUser::default()
    };
    repo.get_or_create_user(&admin).await.unwrap().0
}

/// A regular, group-less user.
pub async fn plain_user(repo: &InMemoryRepository, username: &str) -> User {
    let new_user = NewUser {
        username: username.to_string(),
        ..NewUser::default()
    };
    repo.get_or_create_user(&new_user).await.unwrap().0
}
