//! OAuth 2.0 request and response bodies

use chrono::{DateTime, Utc};
use oauth_engine::{format_scopes, Client, CredentialSource, Principal, Scope, Token};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Authorization endpoint parameters (RFC 6749 §4.1.1, §4.2.1)
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// `code` or `token`
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (S256 or plain)
    pub code_challenge_method: Option<String>,
}

/// Consent form submitted by the resource owner
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeDecisionForm {
    #[serde(flatten)]
    pub params: AuthorizeParams,
    /// `approve` or `deny`
    pub decision: Option<String>,
}

/// Scope as shown on the consent prompt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScopeView {
    pub id: String,
    pub help_text: String,
    pub group: String,
}

impl From<Scope> for ScopeView {
    fn from(scope: Scope) -> Self {
        Self {
            id: scope.id,
            help_text: scope.help_text,
            group: scope.group,
        }
    }
}

/// What the resource owner is asked to approve
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationPromptResponse {
    pub client_id: String,
    pub client_name: String,
    pub response_type: String,
    pub redirect_uri: String,
    pub scopes: Vec<ScopeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Token endpoint request (RFC 6749 §4.1.3, §4.3.2, §4.4.2, §6)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// authorization_code, client_credentials, password or refresh_token
    pub grant_type: Option<String>,
    /// Client identifier, unless sent with HTTP Basic authentication
    pub client_id: Option<String>,
    /// Client secret, unless sent with HTTP Basic authentication
    pub client_secret: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
}

/// Token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until expiry, absent for tokens that never expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes (space-separated)
    pub scope: String,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            expires_in: token.expires_in(Utc::now()),
            scope: format_scopes(&token.scopes),
            access_token: token.access_token,
            token_type: token.token_type,
            refresh_token: token.refresh_token,
        }
    }
}

/// Token introspection request (RFC 7662 §2.1)
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectionRequest {
    pub token: String,
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

/// Token introspection response (RFC 7662 §2.2)
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Expiry as Unix time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time as Unix time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl From<Option<Token>> for IntrospectionResponse {
    fn from(token: Option<Token>) -> Self {
        match token {
            Some(token) => Self {
                active: true,
                scope: Some(format_scopes(&token.scopes)),
                exp: token.expires_at.map(|at| at.timestamp()),
                iat: Some(token.issued_at.timestamp()),
                client_id: token.client_id,
                user_id: token.user_id,
                token_type: Some(token.token_type),
            },
            None => Self::default(),
        }
    }
}

/// Token revocation request (RFC 7009 §2.1)
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevocationRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

/// The principal behind the presented access token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenInfoResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scope: String,
    pub is_personal: bool,
    pub is_internal: bool,
    /// `bearer_header` or `legacy_query_key`
    pub source: String,
}

impl From<&Principal> for TokenInfoResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.user_id.clone(),
            client_id: principal.client_id.clone(),
            scope: format_scopes(&principal.scopes),
            is_personal: principal.is_personal,
            is_internal: principal.is_internal,
            source: match principal.source {
                CredentialSource::BearerHeader => "bearer_header",
                CredentialSource::LegacyQueryKey => "legacy_query_key",
            }
            .to_string(),
        }
    }
}

/// Client registration request of an owner
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Public clients get no secret (default: true)
    #[serde(default = "default_confidential")]
    pub is_confidential: bool,
    /// Scopes usable in non-interactive grants (space-separated)
    #[serde(default)]
    pub allowed_scopes: Option<String>,
}

fn default_confidential() -> bool {
    true
}

/// A registered client, without its secret
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientResponse {
    pub client_id: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub is_confidential: bool,
    pub is_internal: bool,
    pub allowed_scopes: String,
    pub created_at: DateTime<Utc>,
    /// Present once, right after registration or rotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl ClientResponse {
    pub fn new(client: Client, client_secret: Option<String>) -> Self {
        Self {
            allowed_scopes: format_scopes(&client.allowed_scopes),
            client_id: client.client_id,
            name: client.name,
            redirect_uris: client.redirect_uris.into_iter().collect(),
            is_confidential: client.is_confidential,
            is_internal: client.is_internal,
            created_at: client.created_at,
            client_secret,
        }
    }
}

/// New secret of a confidential client
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClientSecretResponse {
    pub client_id: String,
    pub client_secret: String,
}

/// Personal token request
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CreateTokenRequest {
    /// Requested scopes (space-separated)
    #[serde(default)]
    pub scope: Option<String>,
}

/// Revokes one of the owner's tokens; the token travels in the body so it
/// stays out of URLs and access logs
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RevokeUserTokenRequest {
    pub token: String,
}

/// A personal token as listed in the owner's settings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonalTokenResponse {
    pub access_token: String,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Token> for PersonalTokenResponse {
    fn from(token: Token) -> Self {
        Self {
            scope: format_scopes(&token.scopes),
            access_token: token.access_token,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        }
    }
}
