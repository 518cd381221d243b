use crate::config::Settings;
use crate::errors::StartupError;
use log::{info, warn};
use oauth_engine::{
    create_store, AuthorizationEngine, ClientStore, DefaultScopes, RequestAuthenticator,
    ScopeRegistry, Store, UserAuthenticator,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<Store>,
    pub engine: Arc<AuthorizationEngine>,
    pub authenticator: Arc<RequestAuthenticator>,
}

impl AppState {
    pub async fn new(settings: Settings) -> Result<Self, StartupError> {
        let store = create_store(&settings.store_settings()).await?;
        Self::with_store(settings, store).await
    }

    /// Builds the state around an existing store: fills and seals the scope
    /// registry, then registers the configured clients.
    pub async fn with_store(settings: Settings, store: Store) -> Result<Self, StartupError> {
        let mut registry = ScopeRegistry::new();
        registry.register_provider(&DefaultScopes)?;
        registry.register_provider(&settings.scopes)?;
        registry.seal();
        info!("Scope registry sealed with {} scopes", registry.all().len());

        let store = Arc::new(store);
        let engine = AuthorizationEngine::with_store(
            Arc::new(registry),
            store.clone(),
            settings.grant_policy(),
        );
        let authenticator =
            RequestAuthenticator::new(engine.token_store(), settings.oauth.legacy_query_key);

        for seed in &settings.clients {
            // a persistent store keeps clients from earlier runs
            if store.get_client(&seed.client_id).await?.is_some() {
                info!("Client '{}' already registered, skipping", seed.client_id);
                continue;
            }
            engine.register_client(seed.registration()).await?;
        }

        Ok(Self {
            settings: Arc::new(settings),
            store,
            engine: Arc::new(engine),
            authenticator: Arc::new(authenticator),
        })
    }

    /// Enables the password grant for embedding applications that own
    /// user credentials
    #[allow(dead_code)]
    pub fn with_user_authenticator(mut self, authenticator: Arc<dyn UserAuthenticator>) -> Self {
        let engine = (*self.engine).clone().with_user_authenticator(authenticator);
        self.engine = Arc::new(engine);
        self
    }

    /// Check if all components are healthy
    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        }
    }
}
