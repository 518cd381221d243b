//! Persisted records and the per-request authentication context

use crate::scope::ScopeSet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Grant types accepted at the token endpoint, plus the two token sources that
/// never pass through it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    Implicit,
    ClientCredentials,
    Password,
    RefreshToken,
    Personal,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
            Self::Personal => "personal",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered OAuth client application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    /// Hex-encoded SHA-256 of the client secret; empty for public clients
    pub client_secret_hash: String,
    pub redirect_uris: BTreeSet<String>,
    pub is_confidential: bool,
    pub is_internal: bool,
    pub owner_id: String,
    /// Upper bound for scopes obtained without an owner decision
    pub allowed_scopes: ScopeSet,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.contains(redirect_uri)
    }
}

/// Authorization code awaiting redemption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: ScopeSet,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Grant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Expired and revoked tokens are kept this long so lookups can still tell
/// them apart from unknown tokens.
pub const TOKEN_RETENTION_SECS: i64 = 86_400;

/// Access token with its optional refresh token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absent for personal tokens
    pub client_id: Option<String>,
    /// Absent for client credentials tokens
    pub user_id: Option<String>,
    pub scopes: ScopeSet,
    pub token_type: String,
    pub grant_type: GrantType,
    pub issued_at: DateTime<Utc>,
    /// Absent for tokens that never expire
    pub expires_at: Option<DateTime<Utc>>,
    /// When the refresh token stops being redeemable
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub is_personal: bool,
    pub is_internal: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Usable for authentication at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }

    pub fn is_refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at
            .is_some_and(|refresh_expires_at| refresh_expires_at <= now)
    }

    /// Instant after which the record may be dropped from a store: the later
    /// of access and refresh expiry plus the retention window. Revoked tokens
    /// are retained from their revocation. `None` while the token never expires.
    pub fn retain_until(&self) -> Option<DateTime<Utc>> {
        let retention = Duration::seconds(TOKEN_RETENTION_SECS);
        if let Some(revoked_at) = self.revoked_at {
            return Some(revoked_at + retention);
        }
        let expires_at = self.expires_at?;
        let last_use = match self.refresh_expires_at {
            Some(refresh_expires_at) if refresh_expires_at > expires_at => refresh_expires_at,
            _ => expires_at,
        };
        Some(last_use + retention)
    }

    /// Seconds left until expiry, rounded up. `None` for non-expiring tokens.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<u64> {
        self.expires_at.map(|expires_at| {
            ((expires_at - now).num_milliseconds().max(0) as u64).div_ceil(1000)
        })
    }
}

/// Where a request credential was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    BearerHeader,
    /// Deprecated `?access_token=` query parameter
    LegacyQueryKey,
}

/// The authenticated party behind a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub scopes: ScopeSet,
    pub is_personal: bool,
    pub is_internal: bool,
    pub source: CredentialSource,
}

/// Per-request authentication result, never persisted
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthContext {
    #[default]
    Anonymous,
    Authenticated(Principal),
}

impl AuthContext {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(principal) => Some(principal),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.principal().and_then(|p| p.user_id.as_deref())
    }

    /// Granted scopes, `None` when anonymous
    pub fn granted_scopes(&self) -> Option<&ScopeSet> {
        self.principal().map(|p| &p.scopes)
    }
}
