mod authn_middleware;
pub(crate) mod health;
pub(crate) mod oauth;
mod scope_guard;

use crate::state::AppState;
use axum::Router;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(oauth::router(state))
}
