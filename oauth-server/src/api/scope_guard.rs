use crate::errors::ApiError;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::info;
use oauth_engine::{AuthContext, ScopeGuard};

/// Checks the `AuthContext` left by the authentication middleware against
/// the scopes a route requires. Must be layered inside
/// `authentication_middleware`.
pub(super) async fn scope_guard_middleware(
    State(guard): State<ScopeGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_default();

    if let Err(err) = guard.authorize(&ctx) {
        info!("Access to {} refused: {}", request.uri().path(), err);
        return ApiError::from(err).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use oauth_engine::{CredentialSource, Principal};
    use tower::ServiceExt;

    const TEST_ROUTE: &str = "/records";

    fn principal(scopes: &[&str]) -> AuthContext {
        AuthContext::Authenticated(Principal {
            user_id: Some("u1".to_string()),
            client_id: Some("c1".to_string()),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            is_personal: false,
            is_internal: false,
            source: CredentialSource::BearerHeader,
        })
    }

    /// Router guarded by `guard`, with `ctx` injected the way the
    /// authentication middleware would
    fn guarded_app(guard: ScopeGuard, ctx: Option<AuthContext>) -> Router {
        let router = Router::new()
            .route(TEST_ROUTE, get(async || (StatusCode::OK, "records")))
            .route_layer(axum::middleware::from_fn_with_state(
                guard,
                scope_guard_middleware,
            ));
        match ctx {
            Some(ctx) => router.layer(axum::Extension(ctx)),
            None => router,
        }
    }

    async fn send(app: Router) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .uri(TEST_ROUTE)
            .body(Body::empty())
            .expect("Failed to build request");
        let response = app.oneshot(request).await.expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_granted_scope_passes() {
        let app = guarded_app(ScopeGuard::new(["read"]), Some(principal(&["read", "write"])));
        let (status, _) = send(app).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_scope_is_forbidden() {
        let app = guarded_app(ScopeGuard::new(["read", "write"]), Some(principal(&["read"])));
        let (status, body) = send(app).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "insufficient_scope");
        assert_eq!(body["missing_scopes"], serde_json::json!(["write"]));
    }

    #[tokio::test]
    async fn test_anonymous_needs_authentication() {
        let app = guarded_app(ScopeGuard::default(), Some(AuthContext::Anonymous));
        let (status, body) = send(app).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication_required");

        // no authentication middleware ran at all
        let (status, _) = send(guarded_app(ScopeGuard::default(), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_requirement_only_needs_authentication() {
        let app = guarded_app(ScopeGuard::default(), Some(principal(&[])));
        let (status, _) = send(app).await;
        assert_eq!(status, StatusCode::OK);
    }
}
