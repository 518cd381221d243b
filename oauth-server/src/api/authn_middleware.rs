use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;

/// Resolves the request credentials once and stores the resulting
/// `AuthContext` in the request extensions. Anonymous requests pass through;
/// a presented token that does not authenticate ends the request.
pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // the body is not Sync, so no borrow of the request may cross an await
    let headers = request.headers().clone();
    let query = request.uri().query().map(str::to_string);
    let ctx = match state
        .authenticator
        .authenticate(&headers, query.as_deref())
        .await
    {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(
                "Authentication failed on {}: {}",
                request.uri().path(),
                err
            );
            return ApiError::from(err).into_response();
        }
    };

    request.extensions_mut().insert(ctx);
    next.run(request).await
}
