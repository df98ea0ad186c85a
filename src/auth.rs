use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    menu::Principal,
    models::User,
    repository::RepositoryState,
};

/// Claims
///
/// Payload expected inside an HS256 JSON Web Token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id in the `users` table.
    pub sub: i64,
    /// Expiration Time (exp): the token is rejected after this timestamp.
    pub exp: usize,
    /// Issued At (iat)
    pub iat: usize,
}

/// Principal Extractor Implementation
///
/// Resolves who is calling without ever rejecting the request: the menu context must render
/// for anonymous visitors too, so every failure falls back to `Principal::Anonymous`.
///
/// Resolution order:
/// 1. Local Bypass: in `Env::Local`, an `x-user-id: <id>` header selects the user directly.
/// 2. Bearer Token: `Authorization: Bearer <jwt>`, signature and expiry validated.
/// 3. DB Lookup: the user must exist and be active.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let Some(user_id) = identify(parts, &config) else {
            return Ok(Principal::Anonymous);
        };

        let principal = match repo.get_user(user_id).await {
            Ok(Some(user)) => authenticated(user),
            Ok(None) => {
                tracing::debug!(user_id, "credentials reference an unknown user");
                Principal::Anonymous
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "user lookup failed; treating request as anonymous");
                Principal::Anonymous
            }
        };
        Ok(principal)
    }
}

/// Extracts the claimed user id from the request, if any credential is present and valid.
fn identify(parts: &Parts, config: &AppConfig) -> Option<i64> {
    if config.header_bypass_enabled() {
        let bypass = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|id| id.trim().parse::<i64>().ok());
        if bypass.is_some() {
            return bypass;
        }
    }

    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .strip_prefix("Bearer ")?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            tracing::debug!(error = %e, "rejecting bearer token");
            None
        }
    }
}

fn authenticated(user: User) -> Principal {
    if user.is_active {
        Principal::Authenticated(user)
    } else {
        tracing::debug!(user_id = user.id, "inactive user treated as anonymous");
        Principal::Anonymous
    }
}
