//! OAuth 2.0 endpoint handlers

use crate::api::oauth::extractors::{
    basic_credentials, IntrospectionRequestExtractor, SessionUser,
};
use crate::api::oauth::models::{
    AuthorizationPromptResponse, AuthorizeDecisionForm, AuthorizeParams, IntrospectionRequest,
    IntrospectionResponse, RevocationRequest, TokenInfoResponse, TokenRequest, TokenResponse,
};
use crate::errors::{ApiError, ErrorBody};
use crate::headers::presets;
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, Form, Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use log::{debug, error, info};
use oauth_engine::{
    parse_scopes, AuthContext, AuthorizationRequest, Decision, OAuthError, ResponseType, Token,
};
use url::Url;

const SUPPORTED_GRANT_TYPES: [&str; 4] = [
    "authorization_code",
    "client_credentials",
    "password",
    "refresh_token",
];

/// Where authorization responses are encoded on the redirect URI
#[derive(Debug, Clone, Copy, PartialEq)]
enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    fn for_response_type(response_type: Option<&str>) -> Self {
        match response_type {
            Some("token") => Self::Fragment,
            _ => Self::Query,
        }
    }
}

/// OAuth 2.0 Authorization endpoint (RFC 6749 §3.1)
///
/// Validates the request and returns what the resource owner is asked to
/// approve. Until the client and its redirect URI are verified, errors are
/// answered directly; afterwards they are sent to the redirect URI.
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Consent prompt", body = AuthorizationPromptResponse),
        (status = 302, description = "Error delivered to the client's redirect URI"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let (request, mode) = match checked_request(&state, &params).await {
        Ok(checked) => checked,
        Err(response) => return response,
    };

    match state.engine.validate_authorization_request(&request).await {
        Ok(prompt) => Json(AuthorizationPromptResponse {
            client_id: prompt.client.client_id,
            client_name: prompt.client.name,
            response_type: request.response_type.as_str().to_string(),
            redirect_uri: request.redirect_uri,
            scopes: prompt.scopes.into_iter().map(Into::into).collect(),
            state: request.state,
        })
        .into_response(),
        Err(err) => {
            redirect_with_error(&request.redirect_uri, mode, &err, request.state.as_deref())
        }
    }
}

/// Records the resource owner's decision (RFC 6749 §4.1.2, §4.2.2)
///
/// The code flow redirects with `code` in the query, the implicit flow with
/// the access token in the fragment.
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    request_body(content = AuthorizeDecisionForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the client with the authorization response"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = ErrorBody),
        (status = 401, description = "No logged-in resource owner", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn authorize_decision(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    form: Result<Form<AuthorizeDecisionForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => return ApiError::invalid_request(rejection.body_text()).into_response(),
    };
    let (request, mode) = match checked_request(&state, &form.params).await {
        Ok(checked) => checked,
        Err(response) => return response,
    };
    let client_state = request.state.as_deref();

    let decision = match form.decision.as_deref() {
        Some("approve") => Decision::Approve { user_id },
        Some("deny") => Decision::Deny,
        _ => {
            let err = OAuthError::InvalidRequest("decision must be 'approve' or 'deny'".to_string());
            return redirect_with_error(&request.redirect_uri, mode, &err, client_state);
        }
    };

    match request.response_type {
        ResponseType::Code => match state.engine.request_authorization(&request, decision).await {
            Ok(grant) => {
                let mut params = vec![("code", grant.code.as_str())];
                if let Some(client_state) = client_state {
                    params.push(("state", client_state));
                }
                redirect_to_client(&request.redirect_uri, mode, &params)
            }
            Err(err) => redirect_with_error(&request.redirect_uri, mode, &err, client_state),
        },
        ResponseType::Token => match state.engine.implicit_authorize(&request, decision).await {
            Ok(token) => {
                let response = TokenResponse::from(token);
                let expires_in = response.expires_in.map(|secs| secs.to_string());
                let mut params = vec![
                    ("access_token", response.access_token.as_str()),
                    ("token_type", response.token_type.as_str()),
                    ("scope", response.scope.as_str()),
                ];
                if let Some(expires_in) = &expires_in {
                    params.push(("expires_in", expires_in.as_str()));
                }
                if let Some(client_state) = client_state {
                    params.push(("state", client_state));
                }
                redirect_to_client(&request.redirect_uri, mode, &params)
            }
            Err(err) => redirect_with_error(&request.redirect_uri, mode, &err, client_state),
        },
    }
}

/// Verifies client and redirect URI, then parses the rest of the request
async fn checked_request(
    state: &AppState,
    params: &AuthorizeParams,
) -> Result<(AuthorizationRequest, ResponseMode), Response> {
    let (Some(client_id), Some(redirect_uri)) =
        (params.client_id.as_deref(), params.redirect_uri.as_deref())
    else {
        return Err(
            ApiError::invalid_request("client_id and redirect_uri are required").into_response(),
        );
    };

    if let Err(err) = state.engine.registered_redirect(client_id, redirect_uri).await {
        let mut api_error = ApiError::from(err);
        if api_error.status_code == StatusCode::UNAUTHORIZED {
            api_error.status_code = StatusCode::BAD_REQUEST;
        }
        return Err(api_error.into_response());
    }

    let mode = ResponseMode::for_response_type(params.response_type.as_deref());
    let response_type = params
        .response_type
        .as_deref()
        .ok_or_else(|| OAuthError::InvalidRequest("response_type is required".to_string()))
        .and_then(|value| value.parse::<ResponseType>())
        .map_err(|err| redirect_with_error(redirect_uri, mode, &err, params.state.as_deref()))?;

    let request = AuthorizationRequest {
        response_type,
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
        scopes: parse_scopes(params.scope.as_deref()),
        state: params.state.clone(),
        code_challenge: params.code_challenge.clone(),
        code_challenge_method: params.code_challenge_method.clone(),
    };
    Ok((request, mode))
}

/// Sends the user agent back to the client with `params`
fn redirect_to_client(redirect_uri: &str, mode: ResponseMode, params: &[(&str, &str)]) -> Response {
    let Ok(mut url) = Url::parse(redirect_uri) else {
        return ApiError::invalid_request("Invalid redirect_uri").into_response();
    };

    match mode {
        ResponseMode::Query => {
            url.query_pairs_mut().extend_pairs(params);
        }
        ResponseMode::Fragment => {
            let fragment = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_fragment(Some(&fragment));
        }
    }

    (StatusCode::FOUND, [(LOCATION, url.to_string())]).into_response()
}

/// Delivers an error to the client's redirect URI (RFC 6749 §4.1.2.1)
fn redirect_with_error(
    redirect_uri: &str,
    mode: ResponseMode,
    err: &OAuthError,
    client_state: Option<&str>,
) -> Response {
    let description = if err.is_server_error() {
        error!("Authorization request failed: {}", err);
        "The server encountered an unexpected error".to_string()
    } else {
        info!("Authorization request rejected: {}", err);
        err.to_string()
    };

    let mut params = vec![
        ("error", err.error_code()),
        ("error_description", description.as_str()),
    ];
    if let Some(client_state) = client_state {
        params.push(("state", client_state));
    }
    redirect_to_client(redirect_uri, mode, &params)
}

/// OAuth 2.0 Token endpoint (RFC 6749 §3.2)
///
/// Clients authenticate with form fields or HTTP Basic, never both.
#[utoipa::path(
    post,
    path = "/oauth/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorBody),
        (status = 401, description = "Client authentication failed", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let mut response = match issue_token(&state, &headers, form).await {
        Ok(token) => Json(TokenResponse::from(token)).into_response(),
        Err(err) => err.into_response(),
    };
    presets::no_store().apply(&mut response);
    response
}

async fn issue_token(
    state: &AppState,
    headers: &HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Token, ApiError> {
    let Form(request) = form.map_err(|rejection| ApiError::invalid_request(rejection.body_text()))?;

    let grant_type = required(&request.grant_type, "grant_type")?;
    if !SUPPORTED_GRANT_TYPES.contains(&grant_type) {
        return Err(OAuthError::UnsupportedGrantType(grant_type.to_string()).into());
    }
    // a disabled grant is reported before the client or any parameter is looked at
    if grant_type == "password" && !state.engine.password_grant_available() {
        return Err(OAuthError::GrantTypeDisabled(grant_type.to_string()).into());
    }

    let (client_id, client_secret) = client_credentials(headers, &request)?;
    info!(
        "OAuth token request from client_id: {} with grant_type: {}",
        client_id, grant_type
    );
    let scopes = request.scope.as_deref().map(|scope| parse_scopes(Some(scope)));
    let engine = &state.engine;

    let token = match grant_type {
        "authorization_code" => {
            let code = required(&request.code, "code")?;
            let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;
            engine
                .exchange_code(
                    &client_id,
                    client_secret.as_deref(),
                    code,
                    redirect_uri,
                    request.code_verifier.as_deref(),
                )
                .await?
        }
        "client_credentials" => {
            let client_secret = client_secret.as_deref().ok_or_else(|| {
                OAuthError::InvalidClient("client secret required".to_string())
            })?;
            engine
                .client_credentials(&client_id, client_secret, &scopes.unwrap_or_default())
                .await?
        }
        "password" => {
            let username = required(&request.username, "username")?;
            let password = required(&request.password, "password")?;
            engine
                .password_grant(
                    &client_id,
                    client_secret.as_deref().unwrap_or_default(),
                    username,
                    password,
                    &scopes.unwrap_or_default(),
                )
                .await?
        }
        _ => {
            let refresh_token = required(&request.refresh_token, "refresh_token")?;
            engine
                .refresh_token(
                    &client_id,
                    client_secret.as_deref(),
                    refresh_token,
                    scopes.as_ref(),
                )
                .await?
        }
    };
    Ok(token)
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("{name} is required")))
}

/// Client id and optional secret from HTTP Basic or the form body
fn client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<(String, Option<String>), ApiError> {
    if let Some((client_id, client_secret)) = basic_credentials(headers)? {
        if request.client_secret.is_some() {
            return Err(ApiError::invalid_request(
                "client credentials must be sent with one method only",
            ));
        }
        if request.client_id.as_deref().is_some_and(|id| id != client_id) {
            return Err(ApiError::invalid_request(
                "client_id does not match the Basic credentials",
            ));
        }
        return Ok((client_id, Some(client_secret)));
    }

    let client_id = request
        .client_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::InvalidClient("client authentication required".to_string()))?;
    let client_secret = request.client_secret.clone().filter(|secret| !secret.is_empty());
    Ok((client_id, client_secret))
}

/// OAuth 2.0 Token Introspection endpoint (RFC 7662)
///
/// Accepts form-encoded and JSON bodies. Unknown, expired and revoked tokens
/// are reported as `{"active": false}`.
#[utoipa::path(
    post,
    path = "/oauth/introspect",
    request_body = IntrospectionRequest,
    responses(
        (status = 200, description = "Token introspection result", body = IntrospectionResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn introspect(
    State(state): State<AppState>,
    IntrospectionRequestExtractor(request): IntrospectionRequestExtractor,
) -> Result<Json<IntrospectionResponse>, ApiError> {
    if request.token.is_empty() {
        return Err(ApiError::invalid_request("token parameter is required"));
    }
    let token = state.engine.introspect(&request.token).await?;
    debug!("Token introspection: active={}", token.is_some());
    Ok(Json(token.into()))
}

/// OAuth 2.0 Token Revocation endpoint (RFC 7009)
///
/// Accepts access and refresh tokens. Unknown tokens are not an error.
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    request_body(content = RevocationRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked or unknown"),
        (status = 400, description = "Invalid request", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn revoke(
    State(state): State<AppState>,
    form: Result<Form<RevocationRequest>, FormRejection>,
) -> Result<StatusCode, ApiError> {
    let Form(request) = form.map_err(|rejection| ApiError::invalid_request(rejection.body_text()))?;
    let token = required(&request.token, "token")?;
    if let Some(hint) = &request.token_type_hint {
        debug!("Revocation request with token_type_hint '{}'", hint);
    }
    state.engine.revoke_token(token).await?;
    Ok(StatusCode::OK)
}

/// Describes the principal behind the presented access token
#[utoipa::path(
    get,
    path = "/oauth/info",
    responses(
        (status = 200, description = "Authenticated principal", body = TokenInfoResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    tag = OAUTH_TAG
)]
pub async fn token_info(
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<TokenInfoResponse>, ApiError> {
    let principal = ctx.principal().ok_or(OAuthError::AuthenticationRequired)?;
    Ok(Json(principal.into()))
}
