use crate::store::StoreError;
use thiserror::Error;

/// Errors produced by the authorization engine, the request authenticator and
/// the scope guard.
///
/// Every variant except [`OAuthError::Store`] is a business error that the
/// request boundary turns into an OAuth2 error response.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Client authentication failed: {0}")]
    InvalidClient(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Unauthorized client: {0}")]
    UnauthorizedClient(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Grant type '{0}' is disabled")]
    GrantTypeDisabled(String),

    #[error("The access token is invalid")]
    InvalidToken,

    #[error("The access token has expired")]
    ExpiredToken,

    #[error("The access token has been revoked")]
    RevokedToken,

    #[error("Authentication is required")]
    AuthenticationRequired,

    #[error("Insufficient scope, missing: {}", .missing.join(" "))]
    InsufficientScope { missing: Vec<String> },

    #[error("Scope '{0}' is already registered")]
    DuplicateScope(String),

    #[error("Scope '{0}' is not registered")]
    UnknownScope(String),

    #[error("Scope registry is sealed")]
    RegistrySealed,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OAuthError {
    /// OAuth2 machine-readable error code (RFC 6749 §5.2, RFC 6750 §3.1)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) | Self::GrantTypeDisabled(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidToken | Self::ExpiredToken | Self::RevokedToken => "invalid_token",
            Self::AuthenticationRequired => "authentication_required",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::DuplicateScope(_)
            | Self::UnknownScope(_)
            | Self::RegistrySealed
            | Self::Store(_) => "server_error",
        }
    }

    /// True for failures of the backing store or of startup configuration,
    /// which are not the caller's fault.
    pub fn is_server_error(&self) -> bool {
        self.error_code() == "server_error"
    }
}
