use axum::response::IntoResponse;
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use log::error;
use oauth_engine::{OAuthError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// OAuth2 error response body (RFC 6749 §5.2)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable description
    pub error_description: String,
    /// Scopes the caller lacks, for `insufficient_scope`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_scopes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status_code: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    /// Create a new ApiError with an OAuth2 error code and description
    pub fn new<S: ToString>(status_code: StatusCode, error: &str, description: S) -> Self {
        Self {
            status_code,
            body: ErrorBody {
                error: error.to_string(),
                error_description: description.to_string(),
                missing_scopes: None,
            },
        }
    }

    /// Create new Bad Request Error (400) with an `invalid_request` code
    pub fn invalid_request<S: ToString>(description: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    /// Create new Internal Server Error (500) with a generic description
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "The server encountered an unexpected error",
        )
    }
}

/// Status code of an engine error at the HTTP boundary
pub fn status_for(err: &OAuthError) -> StatusCode {
    match err {
        OAuthError::InvalidRequest(_)
        | OAuthError::InvalidGrant(_)
        | OAuthError::InvalidScope(_)
        | OAuthError::UnauthorizedClient(_)
        | OAuthError::UnsupportedGrantType(_)
        | OAuthError::UnsupportedResponseType(_)
        | OAuthError::GrantTypeDisabled(_) => StatusCode::BAD_REQUEST,
        OAuthError::InvalidClient(_)
        | OAuthError::InvalidToken
        | OAuthError::ExpiredToken
        | OAuthError::RevokedToken
        | OAuthError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        OAuthError::AccessDenied(_) | OAuthError::InsufficientScope { .. } => {
            StatusCode::FORBIDDEN
        }
        OAuthError::DuplicateScope(_)
        | OAuthError::UnknownScope(_)
        | OAuthError::RegistrySealed
        | OAuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        if err.is_server_error() {
            error!("Request failed: {}", err);
            return Self::internal();
        }
        let mut api_error = Self::new(status_for(&err), err.error_code(), &err);
        if let OAuthError::InsufficientScope { missing } = err {
            api_error.body.missing_scopes = Some(missing);
        }
        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let challenged = matches!(
            self.status_code,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        );
        let challenge = match self.body.error.as_str() {
            _ if !challenged => None,
            "invalid_token" | "insufficient_scope" => Some(format!(
                "Bearer error=\"{}\", error_description=\"{}\"",
                self.body.error,
                self.body.error_description.replace('"', "'")
            )),
            "invalid_client" => Some("Basic realm=\"oauth\"".to_string()),
            "authentication_required" => Some("Bearer".to_string()),
            _ => None,
        };

        let mut response = (self.status_code, Json(self.body)).into_response();
        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Failures that stop the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to initialize store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),
}
