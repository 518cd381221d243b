use super::{ClientStore, GrantStore, StoreError, TokenStore};
use crate::models::{Client, Grant, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use moka::future::Cache as MokaCache;
use std::time::Duration;

/// In-process store. Authorization codes expire after the code TTL. Tables
/// are never evicted: once one holds `capacity` records, inserts fail with
/// [`StoreError::CapacityExceeded`] until housekeeping frees room.
#[derive(Clone)]
pub struct InMemoryStore {
    capacity: u64,
    clients: MokaCache<String, Client>,
    grants: MokaCache<String, Grant>,
    tokens: MokaCache<String, Token>,
    /// refresh token -> access token
    refresh_index: MokaCache<String, String>,
}

impl InMemoryStore {
    /// Initialize a new in-memory store
    pub fn new(capacity: u64, code_ttl_secs: u64) -> Self {
        Self {
            capacity,
            clients: MokaCache::builder().build(),
            grants: MokaCache::builder()
                .time_to_live(Duration::from_secs(code_ttl_secs.max(1)))
                .build(),
            tokens: MokaCache::builder().build(),
            refresh_index: MokaCache::builder().build(),
        }
    }

    pub async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }

    /// Refuses a new record once `table` is full
    async fn ensure_room<V>(
        &self,
        table: &MokaCache<String, V>,
        kind: &str,
    ) -> Result<(), StoreError>
    where
        V: Clone + Send + Sync + 'static,
    {
        // entry_count lags behind writes until pending tasks run
        table.run_pending_tasks().await;
        if table.entry_count() >= self.capacity {
            warn!(
                "Memory store refused a new {}: {} records stored",
                kind,
                table.entry_count()
            );
            return Err(StoreError::CapacityExceeded(kind.to_string()));
        }
        Ok(())
    }

    async fn mark_revoked(&self, mut token: Token, now: DateTime<Utc>) {
        if let Some(refresh_token) = &token.refresh_token {
            self.refresh_index.invalidate(refresh_token).await;
        }
        if token.revoked_at.is_none() {
            token.revoked_at = Some(now);
        }
        self.tokens.insert(token.access_token.clone(), token).await;
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        self.ensure_room(&self.clients, "client").await?;
        let client_id = client.client_id.clone();
        let entry = self
            .clients
            .entry(client_id.clone())
            .or_insert_with(async move { client })
            .await;
        if !entry.is_fresh() {
            return Err(StoreError::Conflict(format!("client '{client_id}'")));
        }
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.get(client_id).await)
    }

    async fn update_client(&self, client: Client) -> Result<(), StoreError> {
        self.clients.insert(client.client_id.clone(), client).await;
        Ok(())
    }

    async fn delete_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.remove(client_id).await)
    }

    async fn clients_for_owner(&self, owner_id: &str) -> Result<Vec<Client>, StoreError> {
        let mut clients: Vec<Client> = self
            .clients
            .iter()
            .filter(|(_, client)| client.owner_id == owner_id)
            .map(|(_, client)| client)
            .collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(clients)
    }
}

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        self.ensure_room(&self.grants, "authorization code").await?;
        self.grants.insert(grant.code.clone(), grant).await;
        Ok(())
    }

    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError> {
        Ok(self.grants.remove(code).await)
    }

    async fn delete_grants_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        let codes: Vec<String> = self
            .grants
            .iter()
            .filter(|(_, grant)| grant.client_id == client_id)
            .map(|(code, _)| code.as_ref().clone())
            .collect();
        let mut removed = 0;
        for code in codes {
            if self.grants.remove(&code).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        self.ensure_room(&self.tokens, "access token").await?;
        let access_token = token.access_token.clone();
        let refresh_token = token.refresh_token.clone();
        let entry = self
            .tokens
            .entry(access_token.clone())
            .or_insert_with(async move { token })
            .await;
        if !entry.is_fresh() {
            return Err(StoreError::Conflict("access token".to_string()));
        }
        if let Some(refresh_token) = refresh_token {
            self.refresh_index.insert(refresh_token, access_token).await;
        }
        Ok(())
    }

    async fn get_token(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.get(access_token).await)
    }

    async fn get_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, StoreError> {
        match self.refresh_index.get(refresh_token).await {
            Some(access_token) => Ok(self.tokens.get(&access_token).await),
            None => Ok(None),
        }
    }

    async fn take_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        match self.refresh_index.remove(refresh_token).await {
            Some(access_token) => Ok(self.tokens.get(&access_token).await),
            None => Ok(None),
        }
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool, StoreError> {
        match self.tokens.get(access_token).await {
            Some(token) => {
                self.mark_revoked(token, Utc::now()).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_tokens_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        let tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|(_, token)| token.client_id.as_deref() == Some(client_id))
            .filter(|(_, token)| !token.is_revoked())
            .map(|(_, token)| token)
            .collect();
        let now = Utc::now();
        let count = tokens.len();
        for token in tokens {
            self.mark_revoked(token, now).await;
        }
        Ok(count)
    }

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<Token>, StoreError> {
        let mut tokens: Vec<Token> = self
            .tokens
            .iter()
            .filter(|(_, token)| token.user_id.as_deref() == Some(user_id))
            .map(|(_, token)| token)
            .collect();
        tokens.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(tokens)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let stale: Vec<Token> = self
            .tokens
            .iter()
            .filter(|(_, token)| token.retain_until().is_some_and(|until| until <= now))
            .map(|(_, token)| token)
            .collect();
        let mut purged = 0;
        for token in stale {
            if let Some(refresh_token) = &token.refresh_token {
                self.refresh_index.invalidate(refresh_token).await;
            }
            if self.tokens.remove(&token.access_token).await.is_some() {
                purged += 1;
            }
        }

        let expired_codes: Vec<String> = self
            .grants
            .iter()
            .filter(|(_, grant)| grant.is_expired_at(now))
            .map(|(code, _)| code.as_ref().clone())
            .collect();
        for code in expired_codes {
            if self.grants.remove(&code).await.is_some() {
                purged += 1;
            }
        }

        self.grants.run_pending_tasks().await;
        debug!("Purged {} expired or revoked records from memory store", purged);
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GrantType, TOKEN_RETENTION_SECS};
    use crate::scope::parse_scopes;
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn client(client_id: &str, owner_id: &str) -> Client {
        Client {
            client_id: client_id.to_string(),
            name: "Test app".to_string(),
            client_secret_hash: String::new(),
            redirect_uris: BTreeSet::from(["https://app/cb".to_string()]),
            is_confidential: true,
            is_internal: false,
            owner_id: owner_id.to_string(),
            allowed_scopes: parse_scopes(Some("read")),
            created_at: Utc::now(),
        }
    }

    fn grant(code: &str, client_id: &str) -> Grant {
        let now = Utc::now();
        Grant {
            code: code.to_string(),
            client_id: client_id.to_string(),
            user_id: "u1".to_string(),
            redirect_uri: "https://app/cb".to_string(),
            scopes: parse_scopes(Some("read")),
            code_challenge: None,
            code_challenge_method: None,
            issued_at: now,
            expires_at: now + ChronoDuration::seconds(600),
        }
    }

    fn token(access: &str, refresh: Option<&str>, client_id: &str) -> Token {
        Token {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            client_id: Some(client_id.to_string()),
            user_id: Some("u1".to_string()),
            scopes: parse_scopes(Some("read")),
            token_type: "Bearer".to_string(),
            grant_type: GrantType::AuthorizationCode,
            issued_at: Utc::now(),
            expires_at: Some(Utc::now() + ChronoDuration::seconds(3600)),
            refresh_expires_at: None,
            is_personal: false,
            is_internal: false,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_client_insert_conflict() {
        let store = InMemoryStore::new(1000, 600);
        store.insert_client(client("c1", "owner")).await.unwrap();
        assert!(matches!(
            store.insert_client(client("c1", "other")).await,
            Err(StoreError::Conflict(_))
        ));
        let stored = store.get_client("c1").await.unwrap().unwrap();
        assert_eq!(stored.owner_id, "owner");
        assert_eq!(store.clients_for_owner("owner").await.unwrap().len(), 1);
        assert!(store.clients_for_owner("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_take_grant_is_single_use() {
        let store = InMemoryStore::new(1000, 600);
        store.insert_grant(grant("code-1", "c1")).await.unwrap();
        assert!(store.take_grant("code-1").await.unwrap().is_some());
        assert!(store.take_grant("code-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_take_grant_yields_one_winner() {
        let store = Arc::new(InMemoryStore::new(1000, 600));
        store.insert_grant(grant("race", "c1")).await.unwrap();

        let mut handles = vec![];
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.take_grant("race").await.unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_refresh_index_and_revocation() {
        let store = InMemoryStore::new(1000, 600);
        store
            .insert_token(token("at-1", Some("rt-1"), "c1"))
            .await
            .unwrap();

        let by_refresh = store.get_token_by_refresh("rt-1").await.unwrap().unwrap();
        assert_eq!(by_refresh.access_token, "at-1");

        assert!(store.revoke_token("at-1").await.unwrap());
        assert!(store.get_token("at-1").await.unwrap().unwrap().is_revoked());
        assert!(store.get_token_by_refresh("rt-1").await.unwrap().is_none());
        assert!(!store.revoke_token("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_take_refresh_token_once() {
        let store = InMemoryStore::new(1000, 600);
        store
            .insert_token(token("at-1", Some("rt-1"), "c1"))
            .await
            .unwrap();
        assert!(store.take_refresh_token("rt-1").await.unwrap().is_some());
        assert!(store.take_refresh_token("rt-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_cascade() {
        let store = InMemoryStore::new(1000, 600);
        store.insert_grant(grant("g1", "c1")).await.unwrap();
        store.insert_grant(grant("g2", "c2")).await.unwrap();
        store.insert_token(token("a1", None, "c1")).await.unwrap();
        store.insert_token(token("a2", None, "c1")).await.unwrap();
        store.insert_token(token("a3", None, "c2")).await.unwrap();

        assert_eq!(store.delete_grants_for_client("c1").await.unwrap(), 1);
        assert_eq!(store.revoke_tokens_for_client("c1").await.unwrap(), 2);
        assert!(store.get_token("a1").await.unwrap().unwrap().is_revoked());
        assert!(!store.get_token("a3").await.unwrap().unwrap().is_revoked());
        assert!(store.take_grant("g2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStore::new(1000, 600);
        let mut expired = token("old", Some("rt-old"), "c1");
        expired.expires_at = Some(Utc::now() - ChronoDuration::seconds(5));
        store.insert_token(expired).await.unwrap();
        store.insert_token(token("fresh", None, "c1")).await.unwrap();

        // still within the retention window
        assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 0);
        assert!(store.get_token("old").await.unwrap().is_some());

        let later = Utc::now() + ChronoDuration::seconds(TOKEN_RETENTION_SECS);
        let purged = store.purge_expired(later).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_token("old").await.unwrap().is_none());
        assert!(store.get_token_by_refresh("rt-old").await.unwrap().is_none());
        assert!(store.get_token("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_keeps_token_past_access_expiry() {
        let store = InMemoryStore::new(1000, 600);
        let now = Utc::now();
        let mut t = token("at-1", Some("rt-1"), "c1");
        t.expires_at = Some(now - ChronoDuration::seconds(5));
        t.refresh_expires_at = Some(now + ChronoDuration::days(30));
        store.insert_token(t).await.unwrap();

        let later = now + ChronoDuration::seconds(TOKEN_RETENTION_SECS + 60);
        assert_eq!(store.purge_expired(later).await.unwrap(), 0);
        assert!(store.get_token_by_refresh("rt-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_full_store_refuses_instead_of_evicting() {
        let store = InMemoryStore::new(10, 600);
        for i in 0..10 {
            store
                .insert_token(token(&format!("at-{i}"), Some(&format!("rt-{i}")), "c1"))
                .await
                .unwrap();
        }
        for i in 10..50 {
            assert!(matches!(
                store.insert_token(token(&format!("at-{i}"), None, "c1")).await,
                Err(StoreError::CapacityExceeded(_))
            ));
        }

        for i in 0..10 {
            assert!(store.get_token(&format!("at-{i}")).await.unwrap().is_some());
            assert!(store
                .get_token_by_refresh(&format!("rt-{i}"))
                .await
                .unwrap()
                .is_some());
        }
        assert!(store.get_token("at-10").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_frees_room() {
        let store = InMemoryStore::new(2, 600);
        store.insert_client(client("c1", "owner")).await.unwrap();
        store.insert_client(client("c2", "owner")).await.unwrap();
        assert!(matches!(
            store.insert_client(client("c3", "owner")).await,
            Err(StoreError::CapacityExceeded(_))
        ));
        assert_eq!(store.clients_for_owner("owner").await.unwrap().len(), 2);

        store.insert_token(token("a1", None, "c1")).await.unwrap();
        store.insert_token(token("a2", None, "c1")).await.unwrap();
        store.revoke_token("a1").await.unwrap();
        let later = Utc::now() + ChronoDuration::seconds(TOKEN_RETENTION_SECS + 1);
        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        store.insert_token(token("a3", None, "c1")).await.unwrap();
    }
}
