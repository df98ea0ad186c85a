use thiserror::Error;

/// RepoError
///
/// Failure of a single persistence operation. Callers decide whether to propagate or degrade.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("store error: {0}")]
    Internal(String),
}

/// MenuError
///
/// Why a menu list could not be computed. The resolver never surfaces this to the page;
/// it is logged and kept on the resolved context for inspection.
#[derive(Debug, Error)]
pub enum MenuError {
    /// The session points at a group that no longer exists.
    #[error("group {0} does not exist")]
    GroupNotFound(i64),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}
