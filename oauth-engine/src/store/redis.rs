use super::{ClientStore, GrantStore, StoreError, TokenStore};
use crate::models::{Client, Grant, Token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use redis::{aio::ConnectionManager, AsyncCommands, Client as RedisClient, RedisError};
use serde::de::DeserializeOwned;

/// Keys scanned per SCAN round trip during housekeeping
const SCAN_COUNT: usize = 500;

fn client_key(client_id: &str) -> String {
    format!("oauth:client:{client_id}")
}

fn owner_clients_key(owner_id: &str) -> String {
    format!("oauth:owner_clients:{owner_id}")
}

fn grant_key(code: &str) -> String {
    format!("oauth:grant:{code}")
}

fn client_grants_key(client_id: &str) -> String {
    format!("oauth:client_grants:{client_id}")
}

fn token_key(access_token: &str) -> String {
    format!("oauth:token:{access_token}")
}

fn refresh_key(refresh_token: &str) -> String {
    format!("oauth:refresh:{refresh_token}")
}

fn client_tokens_key(client_id: &str) -> String {
    format!("oauth:client_tokens:{client_id}")
}

fn user_tokens_key(user_id: &str) -> String {
    format!("oauth:user_tokens:{user_id}")
}

fn backend(operation: &str, key: &str, err: RedisError) -> StoreError {
    error!("Redis error while {} key {}: {}", operation, key, err);
    StoreError::Backend(err.to_string())
}

fn decode<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>, StoreError> {
    match value {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

/// Seconds a token record should live in Redis, `None` for no expiry
fn token_ttl(token: &Token, now: DateTime<Utc>) -> Option<u64> {
    token
        .retain_until()
        .map(|until| (until - now).num_seconds().max(1) as u64)
}

#[derive(Clone)]
pub struct RedisStore {
    _client: RedisClient,
    conn_manager: ConnectionManager,
    code_ttl: u64,
}

impl RedisStore {
    /// Initialize a new Redis store
    pub async fn new(redis_url: &str, code_ttl: u64) -> Result<Self, String> {
        let client = match RedisClient::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            _client: client,
            conn_manager,
            code_ttl: code_ttl.max(1),
        })
    }

    pub async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|err| backend("getting", key, err))?;
        decode(value)
    }

    /// Writes a token record, keeping its TTL in step with its state
    async fn write_token(&self, token: &Token, now: DateTime<Utc>) -> Result<(), StoreError> {
        let key = token_key(&token.access_token);
        let serialized = serde_json::to_string(token)?;
        let mut conn = self.conn_manager.clone();
        match token_ttl(token, now) {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(&key, serialized, ttl)
                .await
                .map_err(|err| backend("setting", &key, err)),
            None => conn
                .set::<_, _, ()>(&key, serialized)
                .await
                .map_err(|err| backend("setting", &key, err)),
        }
    }

    async fn mark_revoked(&self, mut token: Token, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(refresh_token) = &token.refresh_token {
            let key = refresh_key(refresh_token);
            let mut conn = self.conn_manager.clone();
            conn.del::<_, ()>(&key)
                .await
                .map_err(|err| backend("deleting", &key, err))?;
        }
        if token.revoked_at.is_none() {
            token.revoked_at = Some(now);
        }
        self.write_token(&token, now).await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.smembers(key)
            .await
            .map_err(|err| backend("reading members of", key, err))
    }

    async fn remove_members(&self, index: &str, stale: Vec<String>) -> Result<usize, StoreError> {
        if stale.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        conn.srem(index, stale)
            .await
            .map_err(|err| backend("removing from", index, err))
    }

    /// Drops index members whose token record has expired out of Redis
    async fn prune_token_index(&self, index: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut stale = Vec::new();
        for access_token in self.members(index).await? {
            let key = token_key(&access_token);
            let exists: bool = conn
                .exists(&key)
                .await
                .map_err(|err| backend("checking", &key, err))?;
            if !exists {
                stale.push(access_token);
            }
        }
        self.remove_members(index, stale).await
    }

    /// Collects every key matching `pattern` with cursor-based SCAN
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|err| backend("scanning", pattern, err))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl ClientStore for RedisStore {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        let key = client_key(&client.client_id);
        let serialized = serde_json::to_string(&client)?;
        let mut conn = self.conn_manager.clone();

        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(serialized)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("setting", &key, err))?;
        if created.is_none() {
            return Err(StoreError::Conflict(format!("client '{}'", client.client_id)));
        }

        let index = owner_clients_key(&client.owner_id);
        conn.sadd::<_, _, ()>(&index, &client.client_id)
            .await
            .map_err(|err| backend("adding to", &index, err))
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        self.get_json(&client_key(client_id)).await
    }

    async fn update_client(&self, client: Client) -> Result<(), StoreError> {
        let key = client_key(&client.client_id);
        let serialized = serde_json::to_string(&client)?;
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(&key, serialized)
            .await
            .map_err(|err| backend("setting", &key, err))
    }

    async fn delete_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        let key = client_key(client_id);
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("deleting", &key, err))?;
        let client: Option<Client> = decode(value)?;

        if let Some(client) = &client {
            let index = owner_clients_key(&client.owner_id);
            conn.srem::<_, _, ()>(&index, client_id)
                .await
                .map_err(|err| backend("removing from", &index, err))?;
        }
        Ok(client)
    }

    async fn clients_for_owner(&self, owner_id: &str) -> Result<Vec<Client>, StoreError> {
        let mut clients = Vec::new();
        for client_id in self.members(&owner_clients_key(owner_id)).await? {
            if let Some(client) = self.get_client(&client_id).await? {
                clients.push(client);
            }
        }
        clients.sort_by(|a: &Client, b: &Client| a.created_at.cmp(&b.created_at));
        Ok(clients)
    }
}

#[async_trait]
impl GrantStore for RedisStore {
    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        let key = grant_key(&grant.code);
        let serialized = serde_json::to_string(&grant)?;
        let mut conn = self.conn_manager.clone();

        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(serialized)
            .arg("NX")
            .arg("EX")
            .arg(self.code_ttl)
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("setting", &key, err))?;
        if created.is_none() {
            return Err(StoreError::Conflict("authorization code".to_string()));
        }

        let index = client_grants_key(&grant.client_id);
        conn.sadd::<_, _, ()>(&index, &grant.code)
            .await
            .map_err(|err| backend("adding to", &index, err))?;
        conn.expire::<_, ()>(&index, self.code_ttl as i64)
            .await
            .map_err(|err| backend("expiring", &index, err))
    }

    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError> {
        let key = grant_key(code);
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("taking", &key, err))?;
        decode(value)
    }

    async fn delete_grants_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        let index = client_grants_key(client_id);
        let mut removed = 0;
        let mut conn = self.conn_manager.clone();
        for code in self.members(&index).await? {
            let key = grant_key(&code);
            let deleted: usize = conn
                .del(&key)
                .await
                .map_err(|err| backend("deleting", &key, err))?;
            removed += deleted;
        }
        conn.del::<_, ()>(&index)
            .await
            .map_err(|err| backend("deleting", &index, err))?;
        Ok(removed)
    }
}

#[async_trait]
impl TokenStore for RedisStore {
    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        let now = Utc::now();
        let key = token_key(&token.access_token);
        let serialized = serde_json::to_string(&token)?;
        let ttl = token_ttl(&token, now);
        let mut conn = self.conn_manager.clone();

        let mut set = redis::cmd("SET");
        set.arg(&key).arg(serialized).arg("NX");
        if let Some(ttl) = ttl {
            set.arg("EX").arg(ttl);
        }
        let created: Option<String> = set
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("setting", &key, err))?;
        if created.is_none() {
            return Err(StoreError::Conflict("access token".to_string()));
        }

        if let Some(refresh_token) = &token.refresh_token {
            let refresh = refresh_key(refresh_token);
            match ttl {
                Some(ttl) => conn
                    .set_ex::<_, _, ()>(&refresh, &token.access_token, ttl)
                    .await
                    .map_err(|err| backend("setting", &refresh, err))?,
                None => conn
                    .set::<_, _, ()>(&refresh, &token.access_token)
                    .await
                    .map_err(|err| backend("setting", &refresh, err))?,
            }
        }
        if let Some(client_id) = &token.client_id {
            let index = client_tokens_key(client_id);
            conn.sadd::<_, _, ()>(&index, &token.access_token)
                .await
                .map_err(|err| backend("adding to", &index, err))?;
        }
        if let Some(user_id) = &token.user_id {
            let index = user_tokens_key(user_id);
            conn.sadd::<_, _, ()>(&index, &token.access_token)
                .await
                .map_err(|err| backend("adding to", &index, err))?;
        }
        Ok(())
    }

    async fn get_token(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        self.get_json(&token_key(access_token)).await
    }

    async fn get_token_by_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Token>, StoreError> {
        let key = refresh_key(refresh_token);
        let mut conn = self.conn_manager.clone();
        let access_token: Option<String> = conn
            .get(&key)
            .await
            .map_err(|err| backend("getting", &key, err))?;
        match access_token {
            Some(access_token) => self.get_token(&access_token).await,
            None => Ok(None),
        }
    }

    async fn take_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>, StoreError> {
        let key = refresh_key(refresh_token);
        let mut conn = self.conn_manager.clone();
        let access_token: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|err| backend("taking", &key, err))?;
        match access_token {
            Some(access_token) => self.get_token(&access_token).await,
            None => Ok(None),
        }
    }

    async fn revoke_token(&self, access_token: &str) -> Result<bool, StoreError> {
        match self.get_token(access_token).await? {
            Some(token) => {
                self.mark_revoked(token, Utc::now()).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_tokens_for_client(&self, client_id: &str) -> Result<usize, StoreError> {
        let now = Utc::now();
        let index = client_tokens_key(client_id);
        let mut revoked = 0;
        let mut stale = Vec::new();
        for access_token in self.members(&index).await? {
            match self.get_token(&access_token).await? {
                Some(token) if !token.is_revoked() => {
                    self.mark_revoked(token, now).await?;
                    revoked += 1;
                }
                Some(_) => {}
                None => stale.push(access_token),
            }
        }
        self.remove_members(&index, stale).await?;
        Ok(revoked)
    }

    async fn tokens_for_user(&self, user_id: &str) -> Result<Vec<Token>, StoreError> {
        let index = user_tokens_key(user_id);
        let mut tokens = Vec::new();
        let mut stale = Vec::new();
        for access_token in self.members(&index).await? {
            match self.get_token(&access_token).await? {
                Some(token) => tokens.push(token),
                None => stale.push(access_token),
            }
        }
        self.remove_members(&index, stale).await?;
        tokens.sort_by(|a: &Token, b: &Token| a.issued_at.cmp(&b.issued_at));
        Ok(tokens)
    }

    /// Token records expire through their key TTL. This sweeps the client
    /// and user index sets, which have no TTL, for members left behind.
    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut pruned = 0;
        for pattern in ["oauth:client_tokens:*", "oauth:user_tokens:*"] {
            for index in self.scan_keys(pattern).await? {
                pruned += self.prune_token_index(&index).await?;
            }
        }
        if pruned > 0 {
            info!("Pruned {} expired members from Redis token indexes", pruned);
        } else {
            debug!("Redis token indexes hold no expired members");
        }
        Ok(pruned)
    }
}
