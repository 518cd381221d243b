//! Client and personal token management for the logged-in user

use crate::api::oauth::extractors::SessionUser;
use crate::api::oauth::models::{
    ClientResponse, ClientSecretResponse, CreateClientRequest, CreateTokenRequest,
    PersonalTokenResponse, RevokeUserTokenRequest,
};
use crate::errors::{ApiError, ErrorBody};
use crate::headers::presets;
use crate::openapi::SETTINGS_TAG;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use oauth_engine::{parse_scopes, ClientRegistration};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/oauth/settings/clients",
            get(list_clients).post(create_client),
        )
        .route("/oauth/settings/clients/{client_id}", delete(delete_client))
        .route(
            "/oauth/settings/clients/{client_id}/secret",
            post(rotate_client_secret),
        )
        .route(
            "/oauth/settings/tokens",
            get(list_tokens).post(create_token),
        )
        .route("/oauth/settings/tokens/revoke", post(revoke_token))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_request(rejection.body_text()))
}

/// Clients owned by the logged-in user
#[utoipa::path(
    get,
    path = "/oauth/settings/clients",
    responses(
        (status = 200, description = "Registered clients", body = Vec<ClientResponse>),
        (status = 401, description = "No logged-in user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn list_clients(
    State(state): State<AppState>,
    SessionUser(owner_id): SessionUser,
) -> Result<Response, ApiError> {
    let clients: Vec<ClientResponse> = state
        .engine
        .clients_for_owner(&owner_id)
        .await?
        .into_iter()
        .map(|client| ClientResponse::new(client, None))
        .collect();

    let mut response = Json(clients).into_response();
    presets::private_no_cache().apply(&mut response);
    Ok(response)
}

/// Registers a client. The secret of a confidential client is only shown
/// in this response.
#[utoipa::path(
    post,
    path = "/oauth/settings/clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client registered", body = ClientResponse),
        (status = 400, description = "Invalid client", body = ErrorBody),
        (status = 401, description = "No logged-in user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn create_client(
    State(state): State<AppState>,
    SessionUser(owner_id): SessionUser,
    body: Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(body)?;
    let registration = ClientRegistration {
        client_id: None,
        client_secret: None,
        name: request.name,
        owner_id,
        redirect_uris: request.redirect_uris,
        is_confidential: request.is_confidential,
        // internal clients only come from configuration
        is_internal: false,
        allowed_scopes: parse_scopes(request.allowed_scopes.as_deref()),
    };
    let (client, secret) = state.engine.register_client(registration).await?;

    let mut response = (
        StatusCode::CREATED,
        Json(ClientResponse::new(client, secret)),
    )
        .into_response();
    presets::no_store().apply(&mut response);
    Ok(response)
}

/// Deletes a client, its pending codes and its tokens
#[utoipa::path(
    delete,
    path = "/oauth/settings/clients/{client_id}",
    params(("client_id" = String, Path, description = "Client to delete")),
    responses(
        (status = 204, description = "Client deleted"),
        (status = 400, description = "Unknown client", body = ErrorBody),
        (status = 403, description = "Client belongs to another user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn delete_client(
    State(state): State<AppState>,
    SessionUser(owner_id): SessionUser,
    Path(client_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_client(&owner_id, &client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the secret of a confidential client
#[utoipa::path(
    post,
    path = "/oauth/settings/clients/{client_id}/secret",
    params(("client_id" = String, Path, description = "Client whose secret is replaced")),
    responses(
        (status = 200, description = "New secret", body = ClientSecretResponse),
        (status = 400, description = "Unknown or public client", body = ErrorBody),
        (status = 403, description = "Client belongs to another user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn rotate_client_secret(
    State(state): State<AppState>,
    SessionUser(owner_id): SessionUser,
    Path(client_id): Path<String>,
) -> Result<Response, ApiError> {
    let client_secret = state
        .engine
        .rotate_client_secret(&owner_id, &client_id)
        .await?;

    let mut response = Json(ClientSecretResponse {
        client_id,
        client_secret,
    })
    .into_response();
    presets::no_store().apply(&mut response);
    Ok(response)
}

/// Active personal tokens of the logged-in user
#[utoipa::path(
    get,
    path = "/oauth/settings/tokens",
    responses(
        (status = 200, description = "Personal tokens", body = Vec<PersonalTokenResponse>),
        (status = 401, description = "No logged-in user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
) -> Result<Response, ApiError> {
    let tokens: Vec<PersonalTokenResponse> = state
        .engine
        .personal_tokens(&user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    let mut response = Json(tokens).into_response();
    presets::private_no_cache().apply(&mut response);
    Ok(response)
}

/// Issues a personal token to the logged-in user
#[utoipa::path(
    post,
    path = "/oauth/settings/tokens",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = PersonalTokenResponse),
        (status = 400, description = "Invalid scope", body = ErrorBody),
        (status = 401, description = "No logged-in user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn create_token(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    body: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(body)?;
    let scopes = parse_scopes(request.scope.as_deref());
    let token = state
        .engine
        .issue_personal_token(&user_id, &scopes, false)
        .await?;

    let mut response = (
        StatusCode::CREATED,
        Json(PersonalTokenResponse::from(token)),
    )
        .into_response();
    presets::no_store().apply(&mut response);
    Ok(response)
}

/// Revokes one of the logged-in user's tokens
#[utoipa::path(
    post,
    path = "/oauth/settings/tokens/revoke",
    request_body = RevokeUserTokenRequest,
    responses(
        (status = 204, description = "Token revoked"),
        (status = 400, description = "Unknown token or malformed body", body = ErrorBody),
        (status = 403, description = "Token belongs to another user", body = ErrorBody)
    ),
    tag = SETTINGS_TAG
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    body: Result<Json<RevokeUserTokenRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let request = json_body(body)?;
    state
        .engine
        .revoke_user_token(&user_id, &request.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{session_headers, TestFixture, REDIRECT_URI};
    use http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_list_clients() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/clients",
                &json!({
                    "name": "Deposit tool",
                    "redirect_uris": [REDIRECT_URI],
                    "allowed_scopes": "read"
                }),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.headers["cache-control"], "no-store");
        assert_eq!(response.json["is_confidential"], true);
        assert_eq!(response.json["is_internal"], false);
        assert!(response.json["client_secret"].is_string());
        let client_id = response.json["client_id"].as_str().unwrap().to_string();

        let response = fixture
            .get_with_headers("/oauth/settings/clients", &session_headers("alice"))
            .await;
        response.assert_ok();
        assert_eq!(response.headers["cache-control"], "no-cache, private");
        let clients = response.json.as_array().unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0]["client_id"], client_id.as_str());
        // the secret is never listed
        assert!(clients[0].get("client_secret").is_none());

        let response = fixture
            .get_with_headers("/oauth/settings/clients", &session_headers("bob"))
            .await;
        assert_eq!(response.json, json!([]));
    }

    #[tokio::test]
    async fn test_register_client_errors() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/clients",
                &json!({ "name": "Bad", "redirect_uris": ["not a uri"] }),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");

        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/clients",
                &json!({ "redirect_uris": [] }),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = fixture
            .post_json("/oauth/settings/clients", &json!({ "name": "Anonymous" }))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json["error"], "authentication_required");
    }

    #[tokio::test]
    async fn test_rotate_and_delete_client() {
        let fixture = TestFixture::new().await;

        // c1 is owned by "owner"
        let response = fixture
            .send_with_headers(Method::POST, "/oauth/settings/clients/c1/secret", &session_headers("mallory"))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json["error"], "access_denied");

        let response = fixture
            .send_with_headers(Method::POST, "/oauth/settings/clients/c1/secret", &session_headers("owner"))
            .await;
        response.assert_ok();
        let new_secret = response.json["client_secret"].as_str().unwrap().to_string();

        fixture
            .post_form(
                "/oauth/token",
                &format!("grant_type=client_credentials&client_id=c1&client_secret={new_secret}"),
            )
            .await
            .assert_ok();

        let response = fixture
            .send_with_headers(Method::DELETE, "/oauth/settings/clients/c1", &session_headers("owner"))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        let response = fixture
            .send_with_headers(Method::DELETE, "/oauth/settings/clients/c1", &session_headers("owner"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_personal_tokens() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/tokens",
                &json!({ "scope": "read write" }),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json["scope"], "read write");
        assert!(response.json.get("expires_at").is_none());
        let token = response.json["access_token"].as_str().unwrap().to_string();

        let response = fixture
            .get_with_headers("/oauth/info", &[("authorization", format!("Bearer {token}").as_str())])
            .await;
        response.assert_ok();
        assert_eq!(response.json["is_personal"], true);

        let response = fixture
            .get_with_headers("/oauth/settings/tokens", &session_headers("alice"))
            .await;
        assert_eq!(response.json.as_array().unwrap().len(), 1);

        let body = json!({ "token": token });
        fixture
            .post_json_with_headers("/oauth/settings/tokens/revoke", &body, &session_headers("bob"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        fixture
            .post_json_with_headers("/oauth/settings/tokens/revoke", &body, &session_headers("alice"))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = fixture
            .get_with_headers("/oauth/settings/tokens", &session_headers("alice"))
            .await;
        assert_eq!(response.json, json!([]));
    }

    #[tokio::test]
    async fn test_token_revocation_keeps_token_out_of_the_path() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/tokens",
                &json!({ "scope": "read" }),
                &session_headers("alice"),
            )
            .await;
        let token = response.json["access_token"].as_str().unwrap().to_string();

        let response = fixture
            .send_with_headers(
                Method::DELETE,
                &format!("/oauth/settings/tokens/{token}"),
                &session_headers("alice"),
            )
            .await;
        assert!(response.status.is_client_error());

        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/tokens/revoke",
                &json!({}),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_request");

        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/tokens/revoke",
                &json!({ "token": token }),
                &[],
            )
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let response = fixture
            .get_with_headers("/oauth/settings/tokens", &session_headers("alice"))
            .await;
        assert_eq!(response.json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_personal_token_scope_errors() {
        let fixture = TestFixture::new().await;
        let response = fixture
            .post_json_with_headers(
                "/oauth/settings/tokens",
                &json!({ "scope": "unknown" }),
                &session_headers("alice"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json["error"], "invalid_scope");
    }
}
