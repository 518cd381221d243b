//! Grant policy configuration

use confique::Config;

#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// Authorization code lifetime in seconds (default: 600)
    #[config(env = "OAUTH_CODE_TTL", default = 600)]
    pub code_ttl: u64,

    /// Lifetime of tokens issued to users in seconds (default: 3600)
    #[config(env = "OAUTH_ACCESS_TOKEN_TTL", default = 3600)]
    pub access_token_ttl: u64,

    /// Lifetime of client credentials tokens in seconds (default: 3600)
    #[config(env = "OAUTH_CLIENT_CREDENTIALS_TTL", default = 3600)]
    pub client_credentials_ttl: u64,

    /// Lifetime of personal tokens in seconds; unset means they never expire
    #[config(env = "OAUTH_PERSONAL_TOKEN_TTL")]
    pub personal_token_ttl: Option<u64>,

    /// Enable the resource owner password credentials grant (default: false)
    #[config(env = "OAUTH_PASSWORD_GRANT_ENABLED", default = false)]
    pub password_grant_enabled: bool,

    /// Issue refresh tokens with client credentials tokens (default: false)
    #[config(env = "OAUTH_CLIENT_CREDENTIALS_REFRESH", default = false)]
    pub client_credentials_refresh: bool,

    /// Lifetime of refresh tokens in seconds (default: 2592000, 30 days)
    #[config(env = "OAUTH_REFRESH_TOKEN_TTL", default = 2592000)]
    pub refresh_token_ttl: u64,

    /// Issue a new refresh token on every refresh (default: true)
    #[config(env = "OAUTH_ROTATE_REFRESH_TOKENS", default = true)]
    pub rotate_refresh_tokens: bool,

    /// Public clients must use PKCE in the code flow (default: true)
    #[config(env = "OAUTH_REQUIRE_PKCE_FOR_PUBLIC_CLIENTS", default = true)]
    pub require_pkce_for_public_clients: bool,

    /// Accept access tokens in the deprecated `access_token` query
    /// parameter (default: true)
    #[config(env = "OAUTH_LEGACY_QUERY_KEY", default = true)]
    pub legacy_query_key: bool,
}
