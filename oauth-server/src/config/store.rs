use confique::Config;
use oauth_engine::StoreKind;

/// Configuration for the storage backend
#[derive(Debug, Config, Clone)]
pub struct StoreConfig {
    /// Store type: "in-memory" (default) or "redis"
    #[config(env = "OAUTH_STORE_KIND", default = "in-memory")]
    pub kind: StoreKind,

    /// Redis connection string, required for the redis store
    #[config(env = "OAUTH_STORE_REDIS_URL", default = "")]
    pub redis_url: String,

    /// Maximum number of records per in-memory table; inserts beyond it
    /// fail instead of evicting (default: 100000)
    #[config(env = "OAUTH_STORE_CAPACITY", default = 100000)]
    pub capacity: u64,
}
