use std::sync::Arc;

use anyhow::Context;

use crate::auth::{
    jwt::JwtKeys,
    password::Hasher,
    repo::{PgUserRepo, UserRepo},
};
use crate::config::{AppConfig, StoreBackend};
use crate::memory::MemoryStore;
use crate::tasks::repo::{PgTaskRepo, TaskRepo};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub hasher: Hasher,
    pub users: Arc<dyn UserRepo>,
    pub tasks: Arc<dyn TaskRepo>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let (users, tasks): (Arc<dyn UserRepo>, Arc<dyn TaskRepo>) = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL missing")?;
                let db = crate::db::connect(url).await?;
                (
                    Arc::new(PgUserRepo::new(db.clone())) as Arc<dyn UserRepo>,
                    Arc::new(PgTaskRepo::new(db)) as Arc<dyn TaskRepo>,
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store; data is lost on restart");
                let store = Arc::new(MemoryStore::new());
                (
                    store.clone() as Arc<dyn UserRepo>,
                    store as Arc<dyn TaskRepo>,
                )
            }
        };
        let hasher = Hasher::from_config(&config.hash)?;
        Ok(Self::from_parts(Arc::new(config), hasher, users, tasks))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        hasher: Hasher,
        users: Arc<dyn UserRepo>,
        tasks: Arc<dyn TaskRepo>,
    ) -> Self {
        Self {
            keys: JwtKeys::from_config(&config.jwt),
            config,
            hasher,
            users,
            tasks,
        }
    }

    /// Memory-backed state with a fixed secret and a cheap hash work factor.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{HashConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60 * 24 * 7,
            },
            hash: HashConfig {
                memory_kib: Some(1024),
                iterations: Some(1),
            },
            cors_origins: Vec::new(),
        });
        let hasher = Hasher::from_config(&config.hash).expect("test hash params");
        let store = Arc::new(MemoryStore::new());
        Self::from_parts(
            config,
            hasher,
            store.clone() as Arc<dyn UserRepo>,
            store as Arc<dyn TaskRepo>,
        )
    }
}
