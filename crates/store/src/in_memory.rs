//! In-memory store for tests and ephemeral sessions.

use async_trait::async_trait;
use prepwise_core::error::StoreError;
use prepwise_core::log::{GenerationLogEntry, LogSink};
use prepwise_core::store::{CounterStore, IncrementOutcome, SettingsStore};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

/// A store that keeps settings, log entries and counters in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    settings: RwLock<HashMap<String, Value>>,
    logs: RwLock<Vec<GenerationLogEntry>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of log entries written so far.
    pub async fn log_len(&self) -> usize {
        self.logs.read().await.len()
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.settings.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl LogSink for InMemoryStore {
    async fn append(&self, entry: GenerationLogEntry) -> Result<(), StoreError> {
        self.logs.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<GenerationLogEntry>, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.counters.lock().await.get(key).copied().unwrap_or(0))
    }

    async fn try_increment(
        &self,
        key: &str,
        units: u64,
        ceiling: u64,
    ) -> Result<IncrementOutcome, StoreError> {
        // The lock spans the read and the write.
        let mut counters = self.counters.lock().await;
        let used = counters.entry(key.to_string()).or_insert(0);
        match used.checked_add(units) {
            Some(next) if next <= ceiling => {
                *used = next;
                Ok(IncrementOutcome::Applied { used: next })
            }
            _ => Ok(IncrementOutcome::Rejected { used: *used }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn settings_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get("tools.enabled").await.unwrap().is_none());
        store
            .set("tools.enabled", serde_json::json!(["searchWeb"]))
            .await
            .unwrap();
        let value = store.get("tools.enabled").await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!(["searchWeb"]));
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = InMemoryStore::new();
        for action in ["first", "second", "third"] {
            store
                .append(GenerationLogEntry::new(action, "m"))
                .await
                .unwrap();
        }
        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "third");
        assert_eq!(recent[1].action, "second");
        assert_eq!(store.log_len().await, 3);
    }

    #[tokio::test]
    async fn increment_respects_ceiling() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.try_increment("k", 3, 5).await.unwrap(),
            IncrementOutcome::Applied { used: 3 }
        );
        assert_eq!(
            store.try_increment("k", 3, 5).await.unwrap(),
            IncrementOutcome::Rejected { used: 3 }
        );
        assert_eq!(
            store.try_increment("k", 2, 5).await.unwrap(),
            IncrementOutcome::Applied { used: 5 }
        );
        assert_eq!(store.read("k").await.unwrap(), 5);
        assert_eq!(store.read("other").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_never_exceed_ceiling() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_increment("race", 1, 7).await.unwrap()
            }));
        }
        let mut applied = 0;
        for h in handles {
            if h.await.unwrap().is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 7);
        assert_eq!(store.read("race").await.unwrap(), 7);
    }
}
