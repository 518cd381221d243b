//! Request authentication
//!
//! Turns the credentials of an incoming request into an [`AuthContext`].
//! Credentials are looked for in this order:
//!
//! 1. `Authorization: Bearer <token>`
//! 2. the deprecated `access_token` query parameter, when enabled
//!
//! A request without either is anonymous. A request that presents a token
//! which does not authenticate is rejected rather than treated as anonymous.

use crate::error::OAuthError;
use crate::models::{AuthContext, CredentialSource, Principal};
use crate::store::TokenStore;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::{debug, warn};
use std::sync::Arc;

/// Name of the legacy query parameter carrying an access token
pub const LEGACY_QUERY_KEY: &str = "access_token";

#[derive(Clone)]
pub struct RequestAuthenticator {
    tokens: Arc<dyn TokenStore>,
    legacy_query_key: bool,
}

impl RequestAuthenticator {
    pub fn new(tokens: Arc<dyn TokenStore>, legacy_query_key: bool) -> Self {
        Self {
            tokens,
            legacy_query_key,
        }
    }

    /// Authenticates a request from its headers and raw query string
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<AuthContext, OAuthError> {
        if let Some(token) = bearer_token(headers)? {
            let principal = self
                .authenticate_token(&token, CredentialSource::BearerHeader)
                .await?;
            return Ok(AuthContext::Authenticated(principal));
        }

        if self.legacy_query_key {
            if let Some(token) = query.and_then(query_token) {
                warn!(
                    "Request authenticated with the deprecated '{}' query parameter",
                    LEGACY_QUERY_KEY
                );
                let principal = self
                    .authenticate_token(&token, CredentialSource::LegacyQueryKey)
                    .await?;
                return Ok(AuthContext::Authenticated(principal));
            }
        }

        Ok(AuthContext::Anonymous)
    }

    /// Resolves an access token to the principal it stands for
    pub async fn authenticate_token(
        &self,
        access_token: &str,
        source: CredentialSource,
    ) -> Result<Principal, OAuthError> {
        let token = self
            .tokens
            .get_token(access_token)
            .await?
            .ok_or(OAuthError::InvalidToken)?;
        if token.is_revoked() {
            return Err(OAuthError::RevokedToken);
        }
        if token.is_expired_at(Utc::now()) {
            return Err(OAuthError::ExpiredToken);
        }

        debug!(
            "Authenticated token of user '{}' via client '{}'",
            token.user_id.as_deref().unwrap_or("-"),
            token.client_id.as_deref().unwrap_or("-")
        );
        Ok(Principal {
            user_id: token.user_id,
            client_id: token.client_id,
            scopes: token.scopes,
            is_personal: token.is_personal,
            is_internal: token.is_internal,
            source,
        })
    }
}

/// Extracts a bearer token. Other schemes are left to other layers.
fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, OAuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let Ok(value) = value.to_str() else {
        return Ok(None);
    };
    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                return Err(OAuthError::InvalidToken);
            }
            Ok(Some(token.to_string()))
        }
        _ if value.trim().eq_ignore_ascii_case("bearer") => Err(OAuthError::InvalidToken),
        _ => Ok(None),
    }
}

fn query_token(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == LEGACY_QUERY_KEY)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
