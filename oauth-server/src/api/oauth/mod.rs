//! OAuth 2.0 Authorization Server endpoints
//!
//! ## Supported OAuth 2.0 Flows
//! - Authorization Code Grant with optional PKCE (RFC 6749 §4.1, RFC 7636)
//! - Implicit Grant (RFC 6749 §4.2)
//! - Resource Owner Password Credentials Grant (RFC 6749 §4.3), when an
//!   embedding application supplies a user authenticator
//! - Client Credentials Grant (RFC 6749 §4.4)
//! - Refresh Token Grant (RFC 6749 §6)
//! - Token Introspection (RFC 7662) and Revocation (RFC 7009)
//!
//! ## Architecture
//! - The grant logic lives in `oauth_engine::AuthorizationEngine`; handlers
//!   only translate between HTTP and engine calls
//! - The resource owner is identified by an upstream session layer through
//!   a trusted header (see [`extractors::SessionUser`])
//! - `/oauth/settings/*` lets a logged-in user manage their clients and
//!   personal tokens

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod settings;

use crate::api::authn_middleware::authentication_middleware;
use crate::api::scope_guard::scope_guard_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use oauth_engine::ScopeGuard;

/// Creates OAuth 2.0 routes
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/oauth/authorize",
            get(handlers::authorize).post(handlers::authorize_decision),
        )
        .route("/oauth/token", post(handlers::token))
        .route("/oauth/introspect", post(handlers::introspect))
        .route("/oauth/revoke", post(handlers::revoke))
        .merge(settings::router())
        .merge(protected_routes(state))
}

/// Routes for callers holding an access token
fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/oauth/info", get(handlers::token_info))
        .route_layer(middleware::from_fn_with_state(
            ScopeGuard::default(),
            scope_guard_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}
