use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::Method,
};
use tower_sessions::Session;

use crate::{
    AppState,
    menu::{MenuQuery, MenuResolver, Principal, ResolvedContext, SESSION_GROUP_KEY, SessionState},
};

/// menu_context
///
/// [Public Route] Resolves the navigation context for the current principal.
///
/// The active group is loaded from the session, handed to the resolver as explicit state, and
/// written back only when resolution changed it. Session store failures are logged and treated
/// as an empty session; they never fail the request. The query string is read as raw pairs, so
/// a repeated `gpid` keeps its last value and an unreadable query string is ignored.
#[utoipa::path(
    get,
    path = "/menu",
    params(MenuQuery),
    responses((status = 200, description = "Navigation context", body = ResolvedContext))
)]
pub async fn menu_context(
    principal: Principal,
    method: Method,
    session: Session,
    State(state): State<AppState>,
    pairs: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Json<ResolvedContext> {
    let query = match pairs {
        Ok(Query(pairs)) => MenuQuery::from_pairs(pairs),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unreadable query string");
            MenuQuery::default()
        }
    };

    let stored = session
        .get::<i64>(SESSION_GROUP_KEY)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read session; starting without an active group");
            None
        });

    let mut session_state = SessionState { group_id: stored };
    let context = MenuResolver::new(state.repo.clone())
        .resolve(&principal, &mut session_state, &query, &method)
        .await;

    if session_state.group_id != stored {
        if let Some(group_id) = session_state.group_id {
            if let Err(e) = session.insert(SESSION_GROUP_KEY, group_id).await {
                tracing::warn!(error = %e, group_id, "could not persist active group");
            }
        }
    }

    Json(context)
}
