//! Wires every bounded context together from an [`AppConfig`].

use chrono::Duration;
use prepwise_agent::GenerationService;
use prepwise_config::{AppConfig, StorageBackend, StorageConfig};
use prepwise_core::clock::{Clock, SystemClock};
use prepwise_core::error::StoreError;
use prepwise_core::event::EventBus;
use prepwise_core::log::LogSink;
use prepwise_core::store::{CounterStore, SettingsStore};
use prepwise_providers::build_from_config;
use prepwise_quota::QuotaGuard;
use prepwise_routing::{CachedTierStore, SettingsTierRepository, TierConfigResolver, TierConfigStore};
use prepwise_store::InMemoryStore;
use prepwise_telemetry::{ModelPricingCache, ObservabilityLogger};
use prepwise_tools::{HttpSearchBackend, builtin_registry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Metric name crawl units are counted under.
pub const CRAWL_METRIC: &str = "crawl";

/// Tier settings are re-read from the store at most this often.
const TIER_CACHE_TTL_SECS: i64 = 60;

/// The three persistence contracts, usually served by one backend.
#[derive(Clone)]
pub struct Stores {
    pub settings: Arc<dyn SettingsStore>,
    pub counters: Arc<dyn CounterStore>,
    pub logs: Arc<dyn LogSink>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            settings: store.clone(),
            counters: store.clone(),
            logs: store,
        }
    }

    pub async fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage; nothing will persist");
                Ok(Self::in_memory())
            }
            StorageBackend::Sqlite => Self::open_sqlite(config.database_path()).await,
        }
    }

    async fn open_sqlite(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let store = Arc::new(prepwise_store::SqliteStore::new(&path.to_string_lossy()).await?);
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            settings: store.clone(),
            counters: store.clone(),
            logs: store,
        })
    }
}

pub struct App {
    pub config: AppConfig,
    pub stores: Stores,
    pub events: Arc<EventBus>,
    pub tiers: Arc<dyn TierConfigStore>,
    pub quota: Arc<QuotaGuard>,
    pub service: GenerationService,
}

impl App {
    pub async fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let stores = Stores::open(&config.storage).await?;
        Self::with_stores(config, stores)
    }

    pub fn with_stores(config: AppConfig, stores: Stores) -> Result<Self, Box<dyn std::error::Error>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = Arc::new(EventBus::default());

        let router = build_from_config(&config);
        let gateway = router
            .default_provider()
            .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;

        let pricing = Arc::new(ModelPricingCache::from_config(
            gateway,
            &config.telemetry,
            clock.clone(),
        ));
        let logger = Arc::new(
            ObservabilityLogger::new(stores.logs.clone(), pricing)
                .with_events(events.clone())
                .with_log_prompts(config.telemetry.log_prompts),
        );

        let repository = Arc::new(SettingsTierRepository::new(stores.settings.clone()));
        let tiers: Arc<dyn TierConfigStore> = Arc::new(CachedTierStore::new(
            repository,
            Duration::seconds(TIER_CACHE_TTL_SECS),
            clock.clone(),
        ));
        let resolver = Arc::new(TierConfigResolver::new(tiers.clone()));

        let quota = Arc::new(
            QuotaGuard::new(stores.counters.clone(), CRAWL_METRIC, &config.quota)
                .with_clock(clock)
                .with_events(events.clone()),
        );
        let backend = Arc::new(HttpSearchBackend::from_config(&config.tools));
        let registry = Arc::new(builtin_registry(backend, quota.clone(), &config.tools));

        let service = GenerationService::new(
            resolver,
            Arc::new(router),
            logger,
            stores.settings.clone(),
            registry,
            events.clone(),
        )
        .with_default_tools(config.tools.enabled.clone())
        .with_max_steps(config.orchestration.max_steps);

        Ok(Self {
            config,
            stores,
            events,
            tiers,
            quota,
            service,
        })
    }
}

/// Load the config file at `path`, or the default location.
pub fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}
