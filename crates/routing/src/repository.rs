//! Per-tier settings storage.
//!
//! The resolver only needs `get_tier_config(tier)`; writes come from the
//! administrator path (`prepwise init --seed`). [`SettingsTierRepository`]
//! maps tiers onto the generic settings store, and [`CachedTierStore`] puts
//! the process-wide TTL cache in front of any repository.

use async_trait::async_trait;
use chrono::Duration;
use prepwise_core::cache::RefreshCache;
use prepwise_core::clock::Clock;
use prepwise_core::error::StoreError;
use prepwise_core::store::SettingsStore;
use prepwise_core::tier::{Tier, TierConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Narrow repository over per-tier settings.
#[async_trait]
pub trait TierConfigStore: Send + Sync {
    /// The stored configuration, or an unconfigured one if nothing is stored.
    async fn get_tier_config(&self, tier: Tier) -> Result<TierConfig, StoreError>;

    async fn set_tier_config(&self, tier: Tier, config: TierConfig) -> Result<(), StoreError>;
}

/// Tier configs stored as JSON under `tier_config.<tier>`.
pub struct SettingsTierRepository {
    settings: Arc<dyn SettingsStore>,
}

impl SettingsTierRepository {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn key(tier: Tier) -> String {
        format!("tier_config.{tier}")
    }
}

#[async_trait]
impl TierConfigStore for SettingsTierRepository {
    async fn get_tier_config(&self, tier: Tier) -> Result<TierConfig, StoreError> {
        let key = Self::key(tier);
        let Some(value) = self.settings.get(&key).await? else {
            return Ok(TierConfig::unconfigured(tier));
        };

        let mut config: TierConfig =
            serde_json::from_value(value).map_err(|e| StoreError::Malformed {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        // The key is authoritative over whatever tier the document claims.
        config.tier = tier;
        Ok(config)
    }

    async fn set_tier_config(&self, tier: Tier, mut config: TierConfig) -> Result<(), StoreError> {
        config.tier = tier;
        let value = serde_json::to_value(&config).map_err(|e| StoreError::Malformed {
            key: Self::key(tier),
            reason: e.to_string(),
        })?;
        self.settings.set(&Self::key(tier), value).await
    }
}

/// A repository behind a TTL cache holding all tiers at once.
pub struct CachedTierStore {
    inner: Arc<dyn TierConfigStore>,
    cache: RefreshCache<HashMap<Tier, TierConfig>>,
}

impl CachedTierStore {
    pub fn new(inner: Arc<dyn TierConfigStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: RefreshCache::new("tier_config", ttl, clock),
        }
    }

    async fn load_all(&self) -> Result<HashMap<Tier, TierConfig>, StoreError> {
        let mut all = HashMap::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            all.insert(tier, self.inner.get_tier_config(tier).await?);
        }
        debug!(tiers = all.len(), "Loaded tier configuration");
        Ok(all)
    }
}

#[async_trait]
impl TierConfigStore for CachedTierStore {
    async fn get_tier_config(&self, tier: Tier) -> Result<TierConfig, StoreError> {
        let all = self.cache.get_with(|| self.load_all()).await?;
        Ok(all
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| TierConfig::unconfigured(tier)))
    }

    async fn set_tier_config(&self, tier: Tier, config: TierConfig) -> Result<(), StoreError> {
        self.inner.set_tier_config(tier, config).await?;
        self.cache.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use prepwise_core::clock::ManualClock;
    use prepwise_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn configured(tier: Tier, model: &str) -> TierConfig {
        TierConfig {
            primary_model: Some(model.into()),
            ..TierConfig::unconfigured(tier)
        }
    }

    /// Counts reads so cache hits are observable.
    struct CountingStore {
        inner: SettingsTierRepository,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl TierConfigStore for CountingStore {
        async fn get_tier_config(&self, tier: Tier) -> Result<TierConfig, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_tier_config(tier).await
        }

        async fn set_tier_config(&self, tier: Tier, config: TierConfig) -> Result<(), StoreError> {
            self.inner.set_tier_config(tier, config).await
        }
    }

    #[tokio::test]
    async fn missing_tier_reads_as_unconfigured() {
        let repo = SettingsTierRepository::new(Arc::new(InMemoryStore::new()));
        let config = repo.get_tier_config(Tier::High).await.unwrap();
        assert_eq!(config.tier, Tier::High);
        assert!(!config.is_configured());
    }

    #[tokio::test]
    async fn set_then_get() {
        let repo = SettingsTierRepository::new(Arc::new(InMemoryStore::new()));
        repo.set_tier_config(Tier::Low, configured(Tier::Low, "openai/gpt-4o-mini"))
            .await
            .unwrap();
        let config = repo.get_tier_config(Tier::Low).await.unwrap();
        assert_eq!(config.primary_model.as_deref(), Some("openai/gpt-4o-mini"));
    }

    #[tokio::test]
    async fn malformed_setting_is_an_error() {
        let settings = Arc::new(InMemoryStore::new());
        settings
            .set("tier_config.medium", serde_json::json!("not an object"))
            .await
            .unwrap();
        let repo = SettingsTierRepository::new(settings);
        let err = repo.get_tier_config(Tier::Medium).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn cache_serves_until_ttl_then_refreshes() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
        ));
        let settings: Arc<dyn SettingsStore> = Arc::new(InMemoryStore::new());
        let counting = Arc::new(CountingStore {
            inner: SettingsTierRepository::new(settings.clone()),
            reads: AtomicUsize::new(0),
        });
        let cached = CachedTierStore::new(counting.clone(), Duration::minutes(5), clock.clone());

        cached.get_tier_config(Tier::High).await.unwrap();
        cached.get_tier_config(Tier::Low).await.unwrap();
        assert_eq!(counting.reads.load(Ordering::SeqCst), 3);

        // A write behind the cache's back is invisible until the TTL lapses.
        SettingsTierRepository::new(settings)
            .set_tier_config(Tier::High, configured(Tier::High, "m"))
            .await
            .unwrap();
        assert!(!cached.get_tier_config(Tier::High).await.unwrap().is_configured());

        clock.advance(Duration::minutes(5));
        assert!(cached.get_tier_config(Tier::High).await.unwrap().is_configured());
        assert_eq!(counting.reads.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn set_through_cache_invalidates() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let repo = Arc::new(SettingsTierRepository::new(Arc::new(InMemoryStore::new())));
        let cached = CachedTierStore::new(repo, Duration::minutes(15), clock);

        assert!(!cached.get_tier_config(Tier::Medium).await.unwrap().is_configured());
        cached
            .set_tier_config(Tier::Medium, configured(Tier::Medium, "m"))
            .await
            .unwrap();
        assert!(cached.get_tier_config(Tier::Medium).await.unwrap().is_configured());
    }
}
