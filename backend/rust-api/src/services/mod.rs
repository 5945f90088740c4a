use crate::config::Config;
use crate::store::{ContentStore, MongoStore};
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;

use attempt_service::AttemptService;
use content_service::ContentService;
use executor::{Executor, HttpExecutor, TestRunner, UnavailableExecutor};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ContentStore>,
    pub redis: Option<ConnectionManager>,
    pub executor: Arc<dyn Executor>,
    pub test_runner: Arc<dyn TestRunner>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let store: Arc<dyn ContentStore> =
            Arc::new(MongoStore::new(mongo_client.database(&config.mongo_database)));

        let redis = match &config.redis_uri {
            Some(uri) => Some(connect_redis(uri).await?),
            None => {
                tracing::info!("No Redis configured, attempt idempotency cache disabled");
                None
            }
        };

        let (executor, test_runner) = executors_from_config(&config);

        Ok(Self {
            config,
            store,
            redis,
            executor,
            test_runner,
        })
    }

    /// State over an arbitrary store without Redis, for dry runs and tests.
    pub fn with_store(
        config: Config,
        store: Arc<dyn ContentStore>,
        executor: Arc<dyn Executor>,
        test_runner: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            config,
            store,
            redis: None,
            executor,
            test_runner,
        }
    }

    pub fn content(&self) -> ContentService {
        ContentService::new(self.store.clone())
    }

    pub fn attempts(&self) -> AttemptService {
        AttemptService::new(
            self.content(),
            self.redis.clone(),
            self.executor.clone(),
            self.test_runner.clone(),
        )
    }
}

pub fn executors_from_config(config: &Config) -> (Arc<dyn Executor>, Arc<dyn TestRunner>) {
    match HttpExecutor::from_config(&config.executor) {
        Some(http) => {
            tracing::info!("Executor client configured");
            let http = Arc::new(http);
            let executor: Arc<dyn Executor> = http.clone();
            let test_runner: Arc<dyn TestRunner> = http;
            (executor, test_runner)
        }
        None => {
            tracing::warn!("No executor configured; run and code attempts will fail");
            let unavailable = Arc::new(UnavailableExecutor);
            let executor: Arc<dyn Executor> = unavailable.clone();
            let test_runner: Arc<dyn TestRunner> = unavailable;
            (executor, test_runner)
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");
    let client = redis::Client::open(uri)?;

    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}

pub mod attempt_service;
pub mod content_service;
pub mod executor;
pub mod seed_service;
