pub(crate) use crate::config::oauth::OAuthConfig;
pub(crate) use crate::config::store::StoreConfig;
use crate::errors::StartupError;
use confique::Config;
use oauth_engine::{parse_scopes, ClientRegistration, GrantPolicy, Scope, StoreSettings};
use serde::Deserialize;

pub mod oauth;
pub mod store;

/// Name of the environment variable pointing at the TOML configuration file
pub const CONFIG_FILE_ENV: &str = "OAUTH_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "oauth-server.toml";

/// Main configuration structure for the OAuth server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the server will listen to (default: 7766)
    #[config(env = "OAUTH_PORT", default = 7766)]
    pub port: u16,

    /// Header set by the upstream session layer to identify the logged-in
    /// user. Consent and settings endpoints answer 401 while this is unset.
    #[config(env = "OAUTH_SESSION_USER_HEADER")]
    pub session_user_header: Option<String>,

    /// Seconds between purges of expired tokens, 0 disables (default: 300)
    #[config(env = "OAUTH_HOUSEKEEPING_INTERVAL", default = 300)]
    pub housekeeping_interval: u64,

    /// Storage backend
    #[config(nested)]
    pub store: StoreConfig,

    /// Grant policy
    #[config(nested)]
    pub oauth: OAuthConfig,

    /// Clients registered at startup
    #[config(default = [])]
    pub clients: Vec<SeedClient>,

    /// Scopes registered at startup, next to the built-in ones
    #[config(default = [])]
    pub scopes: Vec<Scope>,
}

/// A client declared in the configuration file
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedClient {
    pub client_id: String,
    /// Required for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_confidential")]
    pub is_confidential: bool,
    #[serde(default)]
    pub is_internal: bool,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
}

fn default_confidential() -> bool {
    true
}

impl SeedClient {
    pub fn registration(&self) -> ClientRegistration {
        ClientRegistration {
            client_id: Some(self.client_id.clone()),
            client_secret: self.client_secret.clone(),
            name: self.name.clone(),
            owner_id: self.owner_id.clone(),
            redirect_uris: self.redirect_uris.clone(),
            is_confidential: self.is_confidential,
            is_internal: self.is_internal,
            allowed_scopes: parse_scopes(Some(&self.allowed_scopes.join(" "))),
        }
    }
}

impl Settings {
    /// Loads settings from the environment, then from the TOML file named by
    /// `OAUTH_CONFIG_FILE` (default `oauth-server.toml`). A missing file is
    /// not an error; environment values take precedence.
    pub fn load() -> Result<Self, StartupError> {
        let path =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings = Self::builder().env().file(path).load()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), StartupError> {
        if self.oauth.code_ttl == 0 {
            return Err(StartupError::InvalidConfig(
                "oauth.code_ttl must be greater than zero".to_string(),
            ));
        }
        if self.oauth.access_token_ttl == 0
            || self.oauth.client_credentials_ttl == 0
            || self.oauth.refresh_token_ttl == 0
        {
            return Err(StartupError::InvalidConfig(
                "token lifetimes must be greater than zero".to_string(),
            ));
        }
        if let Some(client) = self
            .clients
            .iter()
            .find(|client| client.is_confidential && client.client_secret.is_none())
        {
            return Err(StartupError::InvalidConfig(format!(
                "confidential client '{}' needs a client_secret",
                client.client_id
            )));
        }
        Ok(())
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            kind: self.store.kind.clone(),
            redis_url: self.store.redis_url.clone(),
            capacity: self.store.capacity,
            code_ttl: self.oauth.code_ttl,
        }
    }

    pub fn grant_policy(&self) -> GrantPolicy {
        GrantPolicy {
            code_ttl: self.oauth.code_ttl,
            access_token_ttl: self.oauth.access_token_ttl,
            client_credentials_ttl: self.oauth.client_credentials_ttl,
            personal_token_ttl: self.oauth.personal_token_ttl,
            password_grant_enabled: self.oauth.password_grant_enabled,
            client_credentials_refresh: self.oauth.client_credentials_refresh,
            refresh_token_ttl: self.oauth.refresh_token_ttl,
            rotate_refresh_tokens: self.oauth.rotate_refresh_tokens,
            require_pkce_for_public_clients: self.oauth.require_pkce_for_public_clients,
        }
    }

    /// Settings made of defaults only, ignoring environment and files
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::builder()
            .load()
            .expect("Failed to build default settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth_engine::StoreKind;
    use std::io::Write;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).expect("Failed to create config file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write config file");
        path
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::for_test();
        assert_eq!(settings.port, 7766);
        assert_eq!(settings.session_user_header, None);
        assert_eq!(settings.housekeeping_interval, 300);
        assert_eq!(settings.store.kind, StoreKind::InMemory);
        assert_eq!(settings.store.redis_url, "");
        assert!(settings.oauth.legacy_query_key);
        assert!(settings.clients.is_empty());
        assert!(settings.scopes.is_empty());
        assert_eq!(settings.grant_policy(), GrantPolicy::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_settings() {
        let path = write_config(
            "oauth-server-file-settings",
            r#"
            port = 8080
            session_user_header = "x-session-user"

            [store]
            kind = "redis"
            redis_url = "redis://localhost:6379"

            [oauth]
            access_token_ttl = 60
            refresh_token_ttl = 86400
            password_grant_enabled = true

            [[scopes]]
            id = "deposit:write"
            help_text = "Create deposits"
            group = "deposit"

            [[clients]]
            client_id = "ci"
            client_secret = "s3cret"
            name = "CI"
            owner_id = "admin"
            allowed_scopes = ["deposit:write"]
            "#,
        );

        let settings = Settings::builder()
            .file(&path)
            .load()
            .expect("Failed to load settings");
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.port, 8080);
        assert_eq!(
            settings.session_user_header.as_deref(),
            Some("x-session-user")
        );
        assert_eq!(settings.store.kind, StoreKind::Redis);
        assert_eq!(settings.store_settings().redis_url, "redis://localhost:6379");
        assert_eq!(settings.grant_policy().access_token_ttl, 60);
        assert_eq!(settings.grant_policy().refresh_token_ttl, 86400);
        assert!(settings.grant_policy().password_grant_enabled);
        assert_eq!(settings.scopes[0].id, "deposit:write");
        assert!(!settings.scopes[0].is_internal);

        let registration = settings.clients[0].registration();
        assert!(registration.is_confidential);
        assert_eq!(registration.client_id.as_deref(), Some("ci"));
        assert_eq!(
            registration.allowed_scopes,
            parse_scopes(Some("deposit:write"))
        );
    }

    #[test]
    fn test_confidential_seed_client_needs_secret() {
        let mut settings = Settings::for_test();
        settings.clients.push(SeedClient {
            client_id: "ci".to_string(),
            client_secret: None,
            name: "CI".to_string(),
            owner_id: "admin".to_string(),
            redirect_uris: vec![],
            is_confidential: true,
            is_internal: false,
            allowed_scopes: vec![],
        });
        assert!(matches!(
            settings.validate(),
            Err(StartupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_code_ttl_is_rejected() {
        let mut settings = Settings::for_test();
        settings.oauth.code_ttl = 0;
        assert!(settings.validate().is_err());
    }
}
