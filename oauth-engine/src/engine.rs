//! Grant flows and token lifecycle
//!
//! [`AuthorizationEngine`] validates every OAuth2 grant, mints tokens into
//! the [`TokenStore`] and owns the client and personal-token management
//! operations. It holds no mutable state of its own; all state lives in the
//! stores, so one engine is shared by every request.

use crate::crypto::{
    generate_client_id, generate_token, hash_secret, is_supported_challenge_method, verify_pkce,
    verify_secret,
};
use crate::error::OAuthError;
use crate::models::{Client, Grant, GrantType, Token};
use crate::scope::{format_scopes, Scope, ScopeRegistry, ScopeSet};
use crate::store::{ClientStore, GrantStore, Store, StoreError, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Tunable lifetimes and switches for the grant flows
#[derive(Debug, Clone, PartialEq)]
pub struct GrantPolicy {
    /// Authorization code lifetime in seconds
    pub code_ttl: u64,
    /// Lifetime of tokens issued to users
    pub access_token_ttl: u64,
    pub client_credentials_ttl: u64,
    /// `None` issues personal tokens that never expire
    pub personal_token_ttl: Option<u64>,
    pub password_grant_enabled: bool,
    /// Whether client credentials tokens carry a refresh token
    pub client_credentials_refresh: bool,
    /// Lifetime of refresh tokens, counted from issuance
    pub refresh_token_ttl: u64,
    /// Issue a new refresh token on every refresh
    pub rotate_refresh_tokens: bool,
    pub require_pkce_for_public_clients: bool,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            code_ttl: 600,
            access_token_ttl: 3600,
            client_credentials_ttl: 3600,
            personal_token_ttl: None,
            password_grant_enabled: false,
            client_credentials_refresh: false,
            refresh_token_ttl: 2_592_000,
            rotate_refresh_tokens: true,
            require_pkce_for_public_clients: true,
        }
    }
}

/// `response_type` of an authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Authorization code flow
    Code,
    /// Implicit flow
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }
}

impl FromStr for ResponseType {
    type Err = OAuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "code" => Ok(Self::Code),
            "token" => Ok(Self::Token),
            other => Err(OAuthError::UnsupportedResponseType(other.to_string())),
        }
    }
}

/// Parameters of a request to the authorization endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    pub response_type: ResponseType,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// The resource owner's answer to a consent prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approve { user_id: String },
    Deny,
}

/// What the resource owner is asked to approve
#[derive(Debug, Clone)]
pub struct AuthorizationPrompt {
    pub client: Client,
    pub scopes: Vec<Scope>,
}

/// Input for [`AuthorizationEngine::register_client`].
///
/// `client_id` and `client_secret` are normally generated; presetting them
/// is meant for seeding clients from configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistration {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub name: String,
    pub owner_id: String,
    pub redirect_uris: Vec<String>,
    pub is_confidential: bool,
    pub is_internal: bool,
    pub allowed_scopes: ScopeSet,
}

#[derive(Debug, Error)]
#[error("Invalid username or password")]
pub struct AuthenticationFailed;

/// Verifies resource owner credentials for the password grant
#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    /// Returns the user id on success
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, AuthenticationFailed>;
}

/// Fixed username/password table, for tests and demos
#[derive(Debug, Clone, Default)]
pub struct StaticUserAuthenticator {
    users: HashMap<String, (String, String)>,
}

impl StaticUserAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, password: &str, user_id: &str) -> Self {
        self.users.insert(
            username.to_string(),
            (hash_secret(password), user_id.to_string()),
        );
        self
    }
}

#[async_trait]
impl UserAuthenticator for StaticUserAuthenticator {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<String, AuthenticationFailed> {
        match self.users.get(username) {
            Some((hash, user_id)) if verify_secret(password, hash) => Ok(user_id.clone()),
            _ => Err(AuthenticationFailed),
        }
    }
}

struct Issuance<'a> {
    client: Option<&'a Client>,
    user_id: Option<String>,
    scopes: ScopeSet,
    grant_type: GrantType,
    ttl: Option<u64>,
    refresh_token: Option<String>,
    /// Keeps an existing refresh deadline instead of starting a new one
    refresh_expires_at: Option<DateTime<Utc>>,
    is_personal: bool,
    is_internal: bool,
}

#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: Arc<ScopeRegistry>,
    clients: Arc<dyn ClientStore>,
    grants: Arc<dyn GrantStore>,
    tokens: Arc<dyn TokenStore>,
    user_authenticator: Option<Arc<dyn UserAuthenticator>>,
    policy: GrantPolicy,
}

impl AuthorizationEngine {
    pub fn new(
        registry: Arc<ScopeRegistry>,
        clients: Arc<dyn ClientStore>,
        grants: Arc<dyn GrantStore>,
        tokens: Arc<dyn TokenStore>,
        policy: GrantPolicy,
    ) -> Self {
        Self {
            registry,
            clients,
            grants,
            tokens,
            user_authenticator: None,
            policy,
        }
    }

    /// Builds an engine whose three stores are the same backend
    pub fn with_store(registry: Arc<ScopeRegistry>, store: Arc<Store>, policy: GrantPolicy) -> Self {
        Self::new(registry, store.clone(), store.clone(), store, policy)
    }

    pub fn with_user_authenticator(mut self, authenticator: Arc<dyn UserAuthenticator>) -> Self {
        self.user_authenticator = Some(authenticator);
        self
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        self.tokens.clone()
    }

    pub fn policy(&self) -> &GrantPolicy {
        &self.policy
    }

    /// Whether the password grant is enabled and has an authenticator to check against
    pub fn password_grant_available(&self) -> bool {
        self.policy.password_grant_enabled && self.user_authenticator.is_some()
    }

    /// Looks up a client and checks that `redirect_uri` equals one of its
    /// registered URIs exactly. Until this succeeds, errors must be shown to
    /// the user agent and never sent to the supplied URI.
    pub async fn registered_redirect(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Client, OAuthError> {
        let client = self
            .clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient(format!("unknown client '{client_id}'")))?;

        if !client.has_redirect_uri(redirect_uri) {
            warn!(
                "Rejected redirect_uri '{}' for client '{}'",
                redirect_uri, client.client_id
            );
            return Err(OAuthError::InvalidRequest(
                "redirect_uri does not match a registered URI".to_string(),
            ));
        }
        Ok(client)
    }

    /// Checks an authorization request before the resource owner is asked
    pub async fn validate_authorization_request(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationPrompt, OAuthError> {
        let client = self
            .registered_redirect(&request.client_id, &request.redirect_uri)
            .await?;

        if request.response_type == ResponseType::Code {
            if let Some(method) = &request.code_challenge_method {
                if !is_supported_challenge_method(method) {
                    return Err(OAuthError::InvalidRequest(format!(
                        "unsupported code_challenge_method '{method}'"
                    )));
                }
            }
            if !client.is_confidential
                && self.policy.require_pkce_for_public_clients
                && request.code_challenge.is_none()
            {
                return Err(OAuthError::UnauthorizedClient(
                    "public clients must send a PKCE code_challenge".to_string(),
                ));
            }
        }

        self.registry.validate(&request.scopes, client.is_internal)?;
        let scopes = self.registry.describe(&request.scopes);
        Ok(AuthorizationPrompt { client, scopes })
    }

    /// Authorization code flow: records the owner's decision as a grant
    pub async fn request_authorization(
        &self,
        request: &AuthorizationRequest,
        decision: Decision,
    ) -> Result<Grant, OAuthError> {
        if request.response_type != ResponseType::Code {
            return Err(OAuthError::UnsupportedResponseType(
                request.response_type.as_str().to_string(),
            ));
        }
        let prompt = self.validate_authorization_request(request).await?;
        let user_id = match decision {
            Decision::Approve { user_id } => user_id,
            Decision::Deny => {
                info!("Resource owner denied client '{}'", prompt.client.client_id);
                return Err(OAuthError::AccessDenied(
                    "the resource owner denied the request".to_string(),
                ));
            }
        };

        let now = Utc::now();
        let grant = Grant {
            code: generate_token(),
            client_id: prompt.client.client_id.clone(),
            user_id,
            redirect_uri: request.redirect_uri.clone(),
            scopes: request.scopes.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            issued_at: now,
            expires_at: now + Duration::seconds(self.policy.code_ttl as i64),
        };
        self.grants.insert_grant(grant.clone()).await?;

        info!(
            "Issued authorization code for user '{}' via client '{}' with scope '{}'",
            grant.user_id,
            grant.client_id,
            format_scopes(&grant.scopes)
        );
        Ok(grant)
    }

    /// Redeems an authorization code. The code is consumed before any of its
    /// properties are checked, so a failed redemption still burns it.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<Token, OAuthError> {
        let client = self.authenticate_client(client_id, client_secret).await?;

        let grant = self.grants.take_grant(code).await?.ok_or_else(|| {
            OAuthError::InvalidGrant("authorization code is invalid or already used".to_string())
        })?;

        if grant.is_expired_at(Utc::now()) {
            return Err(OAuthError::InvalidGrant(
                "authorization code has expired".to_string(),
            ));
        }
        if grant.client_id != client.client_id {
            warn!(
                "Client '{}' tried to redeem a code issued to '{}'",
                client.client_id, grant.client_id
            );
            return Err(OAuthError::InvalidGrant(
                "authorization code was issued to another client".to_string(),
            ));
        }
        if grant.redirect_uri != redirect_uri {
            return Err(OAuthError::InvalidGrant("redirect_uri mismatch".to_string()));
        }
        if let Some(challenge) = &grant.code_challenge {
            let verifier = code_verifier.ok_or_else(|| {
                OAuthError::InvalidGrant("code_verifier required".to_string())
            })?;
            if !verify_pkce(challenge, grant.code_challenge_method.as_deref(), verifier) {
                return Err(OAuthError::InvalidGrant(
                    "code_verifier does not match code_challenge".to_string(),
                ));
            }
        }

        self.mint(Issuance {
            client: Some(&client),
            user_id: Some(grant.user_id),
            scopes: grant.scopes,
            grant_type: GrantType::AuthorizationCode,
            ttl: Some(self.policy.access_token_ttl),
            refresh_token: Some(generate_token()),
            refresh_expires_at: None,
            is_personal: false,
            is_internal: client.is_internal,
        })
        .await
    }

    pub async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &ScopeSet,
    ) -> Result<Token, OAuthError> {
        let client = self.confidential_client(client_id, client_secret).await?;
        let scopes = self.bounded_scopes(&client, scopes)?;
        let refresh_token = self
            .policy
            .client_credentials_refresh
            .then(generate_token);

        self.mint(Issuance {
            client: Some(&client),
            user_id: None,
            scopes,
            grant_type: GrantType::ClientCredentials,
            ttl: Some(self.policy.client_credentials_ttl),
            refresh_token,
            refresh_expires_at: None,
            is_personal: false,
            is_internal: client.is_internal,
        })
        .await
    }

    /// Resource owner password credentials grant. Disabled unless both the
    /// policy enables it and a [`UserAuthenticator`] is configured.
    pub async fn password_grant(
        &self,
        client_id: &str,
        client_secret: &str,
        username: &str,
        password: &str,
        scopes: &ScopeSet,
    ) -> Result<Token, OAuthError> {
        let authenticator = match &self.user_authenticator {
            Some(authenticator) if self.password_grant_available() => authenticator,
            _ => {
                return Err(OAuthError::GrantTypeDisabled(
                    GrantType::Password.as_str().to_string(),
                ));
            }
        };

        let client = self.confidential_client(client_id, client_secret).await?;
        let scopes = self.bounded_scopes(&client, scopes)?;
        let user_id = authenticator
            .verify_credentials(username, password)
            .await
            .map_err(|_| {
                warn!("Password grant failed for client '{}'", client.client_id);
                OAuthError::InvalidGrant("invalid resource owner credentials".to_string())
            })?;

        self.mint(Issuance {
            client: Some(&client),
            user_id: Some(user_id),
            scopes,
            grant_type: GrantType::Password,
            ttl: Some(self.policy.access_token_ttl),
            refresh_token: Some(generate_token()),
            refresh_expires_at: None,
            is_personal: false,
            is_internal: client.is_internal,
        })
        .await
    }

    /// Implicit flow: the approved request yields a token directly, never
    /// with a refresh token
    pub async fn implicit_authorize(
        &self,
        request: &AuthorizationRequest,
        decision: Decision,
    ) -> Result<Token, OAuthError> {
        if request.response_type != ResponseType::Token {
            return Err(OAuthError::UnsupportedResponseType(
                request.response_type.as_str().to_string(),
            ));
        }
        let prompt = self.validate_authorization_request(request).await?;
        let user_id = match decision {
            Decision::Approve { user_id } => user_id,
            Decision::Deny => {
                info!("Resource owner denied client '{}'", prompt.client.client_id);
                return Err(OAuthError::AccessDenied(
                    "the resource owner denied the request".to_string(),
                ));
            }
        };

        self.mint(Issuance {
            client: Some(&prompt.client),
            user_id: Some(user_id),
            scopes: request.scopes.clone(),
            grant_type: GrantType::Implicit,
            ttl: Some(self.policy.access_token_ttl),
            refresh_token: None,
            refresh_expires_at: None,
            is_personal: false,
            is_internal: prompt.client.is_internal,
        })
        .await
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// Requested scopes may narrow but never widen the original grant. The
    /// previous access token is revoked.
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
        scopes: Option<&ScopeSet>,
    ) -> Result<Token, OAuthError> {
        let client = self.authenticate_client(client_id, client_secret).await?;

        let current = self
            .tokens
            .get_token_by_refresh(refresh_token)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("refresh token is invalid".to_string()))?;
        if current.client_id.as_deref() != Some(client.client_id.as_str()) {
            return Err(OAuthError::InvalidGrant(
                "refresh token was issued to another client".to_string(),
            ));
        }
        if current.is_revoked() {
            return Err(OAuthError::InvalidGrant(
                "refresh token has been revoked".to_string(),
            ));
        }
        if current.is_refresh_expired_at(Utc::now()) {
            return Err(OAuthError::InvalidGrant(
                "refresh token has expired".to_string(),
            ));
        }

        let scopes = match scopes {
            Some(requested) if !requested.is_empty() => {
                let elevated: Vec<&str> = requested
                    .difference(&current.scopes)
                    .map(String::as_str)
                    .collect();
                if !elevated.is_empty() {
                    return Err(OAuthError::InvalidScope(format!(
                        "scope exceeds the original grant: {}",
                        elevated.join(" ")
                    )));
                }
                requested.clone()
            }
            _ => current.scopes.clone(),
        };

        let previous = self
            .tokens
            .take_refresh_token(refresh_token)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("refresh token already used".to_string()))?;
        self.tokens.revoke_token(&previous.access_token).await?;

        let (next_refresh, refresh_expires_at) = if self.policy.rotate_refresh_tokens {
            (generate_token(), None)
        } else {
            (refresh_token.to_string(), previous.refresh_expires_at)
        };
        let ttl = match previous.grant_type {
            GrantType::ClientCredentials => self.policy.client_credentials_ttl,
            _ => self.policy.access_token_ttl,
        };

        debug!(
            "Refreshing token for client '{}', previous access token revoked",
            client.client_id
        );
        self.mint(Issuance {
            client: Some(&client),
            user_id: previous.user_id,
            scopes,
            grant_type: previous.grant_type,
            ttl: Some(ttl),
            refresh_token: Some(next_refresh),
            refresh_expires_at,
            is_personal: false,
            is_internal: previous.is_internal,
        })
        .await
    }

    /// Registers a client, returning the plaintext secret for confidential
    /// clients. The secret is not retrievable afterwards.
    pub async fn register_client(
        &self,
        registration: ClientRegistration,
    ) -> Result<(Client, Option<String>), OAuthError> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(OAuthError::InvalidRequest("client name is required".to_string()));
        }
        for redirect_uri in &registration.redirect_uris {
            validate_redirect_uri(redirect_uri)?;
        }
        self.registry
            .validate(&registration.allowed_scopes, registration.is_internal)?;

        let secret = match (registration.is_confidential, registration.client_secret) {
            (true, Some(secret)) => Some(secret),
            (true, None) => Some(generate_token()),
            (false, Some(_)) => {
                return Err(OAuthError::InvalidRequest(
                    "public clients cannot have a secret".to_string(),
                ));
            }
            (false, None) => None,
        };

        let client = Client {
            client_id: registration.client_id.unwrap_or_else(generate_client_id),
            name: name.to_string(),
            client_secret_hash: secret.as_deref().map(hash_secret).unwrap_or_default(),
            redirect_uris: registration.redirect_uris.into_iter().collect::<BTreeSet<_>>(),
            is_confidential: registration.is_confidential,
            is_internal: registration.is_internal,
            owner_id: registration.owner_id,
            allowed_scopes: registration.allowed_scopes,
            created_at: Utc::now(),
        };

        match self.clients.insert_client(client.clone()).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(OAuthError::InvalidRequest(format!(
                    "client id '{}' is already registered",
                    client.client_id
                )));
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            "Registered {} client '{}' for owner '{}'",
            if client.is_confidential { "confidential" } else { "public" },
            client.client_id,
            client.owner_id
        );
        Ok((client, secret))
    }

    pub async fn rotate_client_secret(
        &self,
        owner_id: &str,
        client_id: &str,
    ) -> Result<String, OAuthError> {
        let mut client = self.owned_client(owner_id, client_id).await?;
        if !client.is_confidential {
            return Err(OAuthError::UnauthorizedClient(
                "public clients have no secret".to_string(),
            ));
        }
        let secret = generate_token();
        client.client_secret_hash = hash_secret(&secret);
        self.clients.update_client(client).await?;
        info!("Rotated secret of client '{}'", client_id);
        Ok(secret)
    }

    /// Deletes a client together with its grants and tokens
    pub async fn delete_client(&self, owner_id: &str, client_id: &str) -> Result<(), OAuthError> {
        self.owned_client(owner_id, client_id).await?;
        self.clients.delete_client(client_id).await?;
        let grants = self.grants.delete_grants_for_client(client_id).await?;
        let tokens = self.tokens.revoke_tokens_for_client(client_id).await?;
        info!(
            "Deleted client '{}': {} grants removed, {} tokens revoked",
            client_id, grants, tokens
        );
        Ok(())
    }

    pub async fn clients_for_owner(&self, owner_id: &str) -> Result<Vec<Client>, OAuthError> {
        Ok(self.clients.clients_for_owner(owner_id).await?)
    }

    /// Issues a token that belongs to a user directly, without a client
    pub async fn issue_personal_token(
        &self,
        user_id: &str,
        scopes: &ScopeSet,
        is_internal: bool,
    ) -> Result<Token, OAuthError> {
        self.registry.validate(scopes, is_internal)?;
        self.mint(Issuance {
            client: None,
            user_id: Some(user_id.to_string()),
            scopes: scopes.clone(),
            grant_type: GrantType::Personal,
            ttl: self.policy.personal_token_ttl,
            refresh_token: None,
            refresh_expires_at: None,
            is_personal: true,
            is_internal,
        })
        .await
    }

    /// Active personal tokens of a user
    pub async fn personal_tokens(&self, user_id: &str) -> Result<Vec<Token>, OAuthError> {
        let now = Utc::now();
        Ok(self
            .tokens
            .tokens_for_user(user_id)
            .await?
            .into_iter()
            .filter(|token| token.is_personal && token.is_active_at(now))
            .collect())
    }

    /// Revokes one of the user's own tokens
    pub async fn revoke_user_token(&self, user_id: &str, access_token: &str) -> Result<(), OAuthError> {
        let token = self
            .tokens
            .get_token(access_token)
            .await?
            .ok_or_else(|| OAuthError::InvalidRequest("unknown token".to_string()))?;
        if token.user_id.as_deref() != Some(user_id) {
            return Err(OAuthError::AccessDenied(
                "token belongs to another user".to_string(),
            ));
        }
        self.tokens.revoke_token(access_token).await?;
        info!("User '{}' revoked a token", user_id);
        Ok(())
    }

    /// Revokes an access or refresh token. Unknown tokens are ignored.
    pub async fn revoke_token(&self, token: &str) -> Result<(), OAuthError> {
        if self.tokens.revoke_token(token).await? {
            debug!("Revoked access token");
            return Ok(());
        }
        if let Some(owner) = self.tokens.get_token_by_refresh(token).await? {
            self.tokens.revoke_token(&owner.access_token).await?;
            debug!("Revoked token by its refresh token");
        }
        Ok(())
    }

    /// Looks up an access token, returning it only while it is active
    pub async fn introspect(&self, access_token: &str) -> Result<Option<Token>, OAuthError> {
        let now = Utc::now();
        Ok(self
            .tokens
            .get_token(access_token)
            .await?
            .filter(|token| token.is_active_at(now)))
    }

    pub async fn purge_expired(&self) -> Result<usize, OAuthError> {
        Ok(self.tokens.purge_expired(Utc::now()).await?)
    }

    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Client, OAuthError> {
        let client = self
            .clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient(format!("unknown client '{client_id}'")))?;
        if client.is_confidential {
            let secret = client_secret
                .ok_or_else(|| OAuthError::InvalidClient("client secret required".to_string()))?;
            if !verify_secret(secret, &client.client_secret_hash) {
                warn!("Client '{}' failed authentication", client_id);
                return Err(OAuthError::InvalidClient("bad client secret".to_string()));
            }
        }
        Ok(client)
    }

    async fn confidential_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Client, OAuthError> {
        let client = self
            .clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient(format!("unknown client '{client_id}'")))?;
        if !client.is_confidential {
            return Err(OAuthError::UnauthorizedClient(
                "grant type requires a confidential client".to_string(),
            ));
        }
        if !verify_secret(client_secret, &client.client_secret_hash) {
            warn!("Client '{}' failed authentication", client_id);
            return Err(OAuthError::InvalidClient("bad client secret".to_string()));
        }
        Ok(client)
    }

    async fn owned_client(&self, owner_id: &str, client_id: &str) -> Result<Client, OAuthError> {
        let client = self
            .clients
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidRequest(format!("unknown client '{client_id}'")))?;
        if client.owner_id != owner_id {
            return Err(OAuthError::AccessDenied(
                "client belongs to another owner".to_string(),
            ));
        }
        Ok(client)
    }

    /// Scopes for non-interactive grants: registered, and within the client's
    /// allowed scopes. An empty request means all allowed scopes.
    fn bounded_scopes(&self, client: &Client, requested: &ScopeSet) -> Result<ScopeSet, OAuthError> {
        if requested.is_empty() {
            return Ok(client.allowed_scopes.clone());
        }
        self.registry.validate(requested, client.is_internal)?;
        let forbidden: Vec<&str> = requested
            .difference(&client.allowed_scopes)
            .map(String::as_str)
            .collect();
        if !forbidden.is_empty() {
            return Err(OAuthError::InvalidScope(format!(
                "scope not allowed for client: {}",
                forbidden.join(" ")
            )));
        }
        Ok(requested.clone())
    }

    async fn mint(&self, issuance: Issuance<'_>) -> Result<Token, OAuthError> {
        let now = Utc::now();
        let refresh_expires_at = issuance.refresh_token.as_ref().map(|_| {
            issuance
                .refresh_expires_at
                .unwrap_or_else(|| now + Duration::seconds(self.policy.refresh_token_ttl as i64))
        });
        let token = Token {
            access_token: generate_token(),
            refresh_token: issuance.refresh_token,
            client_id: issuance.client.map(|client| client.client_id.clone()),
            user_id: issuance.user_id,
            scopes: issuance.scopes,
            token_type: "Bearer".to_string(),
            grant_type: issuance.grant_type,
            issued_at: now,
            expires_at: issuance
                .ttl
                .map(|ttl| now + Duration::seconds(ttl as i64)),
            refresh_expires_at,
            is_personal: issuance.is_personal,
            is_internal: issuance.is_internal,
            revoked_at: None,
        };
        self.tokens.insert_token(token.clone()).await?;

        info!(
            "Issued {} token for {} via {} with scope '{}'",
            token.grant_type,
            token.user_id.as_deref().unwrap_or("<no user>"),
            token.client_id.as_deref().unwrap_or("<no client>"),
            format_scopes(&token.scopes)
        );
        Ok(token)
    }
}

/// Redirect URIs must be absolute and carry no fragment
fn validate_redirect_uri(redirect_uri: &str) -> Result<(), OAuthError> {
    let url = Url::parse(redirect_uri).map_err(|err| {
        OAuthError::InvalidRequest(format!("invalid redirect URI '{redirect_uri}': {err}"))
    })?;
    if url.fragment().is_some() {
        return Err(OAuthError::InvalidRequest(format!(
            "redirect URI '{redirect_uri}' must not contain a fragment"
        )));
    }
    Ok(())
}
