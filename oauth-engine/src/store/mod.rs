use crate::models::{Client, Grant, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    Conflict(String),
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store is full, refusing new {0}")]
    CapacityExceeded(String),
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Persistence of registered clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Insert a new client, failing with [`StoreError::Conflict`] if the id is taken
    async fn insert_client(&self, client: Client) -> Result<(), StoreError>;

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    /// Replace an existing client record
    async fn update_client(&self, client: Client) -> Result<(), StoreError>;

    /// Remove a client, returning the removed record
    async fn delete_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    async fn clients_for_owner(&self, owner_id: &str) -> Result<Vec<Client>, StoreError>;
}

/// Persistence of authorization codes
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError>;

    /// Atomically remove and return a grant.
    ///
    /// Concurrent callers for the same code observe the grant at most once:
    /// exactly one of them receives `Some`.
    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError>;

    /// Delete all outstanding grants of a client, returning how many were removed
    async fn delete_grants_for_client(&self, client_id: &str) -> Result<usize, StoreError>;
}

/// Persistence of access/refresh token pairs
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new token, failing with [`StoreError::Conflict`] on a duplicate
    /// access token
    async fn insert_token(&self, token: Token) -> Result<(), StoreError>;

    async fn get_token(&self, access_token: &str) -> Result<Option<Token>, StoreError>;

    async fn get_token_by_refresh(&self, refresh_token: &str)
        -> Result<Option<Token>, StoreError>;

    /// Atomically detach a refresh token from its access token and return the
    /// token it belonged to. At most one concurrent caller gets `Some`.
    async fn take_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError>;

    /// Mark a token revoked. Returns false when the token is unknown.
    async fn revoke_token(&self, access_token: &str) -> Result<bool, StoreError>;

    /// Revoke every token issued to a client, returning how many were revoked
    async fn revoke_tokens_for_client(&self, client_id: &str) -> Result<usize, StoreError>;

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<Token>, StoreError>;

    /// Best-effort removal of expired and revoked records
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Specifies which store implementation to use
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    #[default]
    InMemory,
    Redis,
}

/// Settings needed to build a [`Store`]
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Redis connection string, required for [`StoreKind::Redis`]
    pub redis_url: String,
    /// Maximum number of records per in-memory table. Inserts beyond it fail.
    pub capacity: u64,
    /// Lifetime of authorization codes in seconds
    pub code_ttl: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::InMemory,
            redis_url: String::new(),
            capacity: 100_000,
            code_ttl: 600,
        }
    }
}

/// Store implementation chosen at runtime from configuration.
///
/// Implements all three store traits by delegating to the selected backend,
/// so a single value can be shared as client, grant and token store.
#[derive(Clone)]
pub enum Store {
    /// In-memory store backed by Moka
    InMemory(memory::InMemoryStore),
    /// Redis-backed store
    Redis(redis::RedisStore),
}

impl Store {
    /// Performs a health check on the backend
    pub async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

#[async_trait]
impl ClientStore for Store {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.insert_client(client).await,
            Self::Redis(store) => store.insert_client(client).await,
        }
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_client(client_id).await,
            Self::Redis(store) => store.get_client(client_id).await,
        }
    }

    async fn update_client(&self, client: Client) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.update_client(client).await,
            Self::Redis(store) => store.update_client(client).await,
        }
    }

    async fn delete_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        match self {
            Self::InMemory(store) => store.delete_client(client_id).await,
            Self::Redis(store) => store.delete_client(client_id).await,
        }
    }

    async fn clients_for_owner(&self, owner_id: &str) -> Result<Vec<Client>, StoreError> {
        match self {
            Self::InMemory(store) => store.clients_for_owner(owner_id).await,
            Self::Redis(store) => store.clients_for_owner(owner_id).await,
        }
    }
}

#[async_trait]
impl GrantStore for Store {
    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.insert_grant(grant).await,
            Self::Redis(store) => store.insert_grant(grant).await,
        }
    }

    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError> {
        match self {
            Self::InMemory(store) => store.take_grant(code).await,
            Self::Redis(store) => store.take_grant(code).await,
        }
    }

    async fn delete_grants_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.delete_grants_for_client(client_id).await,
            Self::Redis(store) => store.delete_grants_for_client(client_id).await,
        }
    }
}

#[async_trait]
impl TokenStore for Store {
    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.insert_token(token).await,
            Self::Redis(store) => store.insert_token(token).await,
        }
    }

    async fn get_token(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_token(access_token).await,
            Self::Redis(store) => store.get_token(access_token).await,
        }
    }

    async fn get_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, StoreError> {
        match self {
            Self::InMemory(store) => store.get_token_by_refresh(refresh_token).await,
            Self::Redis(store) => store.get_token_by_refresh(refresh_token).await,
        }
    }

    async fn take_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        match self {
            Self::InMemory(store) => store.take_refresh_token(refresh_token).await,
            Self::Redis(store) => store.take_refresh_token(refresh_token).await,
        }
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.revoke_token(access_token).await,
            Self::Redis(store) => store.revoke_token(access_token).await,
        }
    }

    async fn revoke_tokens_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.revoke_tokens_for_client(client_id).await,
            Self::Redis(store) => store.revoke_tokens_for_client(client_id).await,
        }
    }

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<Token>, StoreError> {
        match self {
            Self::InMemory(store) => store.tokens_for_user(user_id).await,
            Self::Redis(store) => store.tokens_for_user(user_id).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.purge_expired(now).await,
            Self::Redis(store) => store.purge_expired(now).await,
        }
    }
}

/// Creates the store implementation selected by the settings
pub async fn create_store(settings: &StoreSettings) -> Result<Store, StoreError> {
    match settings.kind {
        StoreKind::InMemory => Ok(Store::InMemory(memory::InMemoryStore::new(
            settings.capacity,
            settings.code_ttl,
        ))),
        StoreKind::Redis => {
            if settings.redis_url.is_empty() {
                return Err(StoreError::Config(
                    "Redis URL is required for Redis store".to_string(),
                ));
            }
            let store = redis::RedisStore::new(&settings.redis_url, settings.code_ttl)
                .await
                .map_err(StoreError::Config)?;
            Ok(Store::Redis(store))
        }
    }
}
