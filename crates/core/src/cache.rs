//! Process-wide read-mostly cache with a TTL and single-flight refresh.
//!
//! Readers never block on a refresh once a value exists: when the cached
//! value is stale, one caller performs the refresh while everyone else keeps
//! reading the stale value. A failed refresh keeps the stale value and counts
//! as an attempt, so the next one waits a full TTL instead of every later
//! caller retrying. Only the very first load waits, since there is nothing
//! to serve yet.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::clock::Clock;

struct Cached<T> {
    value: Arc<T>,
    fetched_at: DateTime<Utc>,
}

pub struct RefreshCache<T> {
    name: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<Option<Cached<T>>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl<T: Send + Sync> RefreshCache<T> {
    pub fn new(name: impl Into<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            ttl,
            clock,
            state: RwLock::new(None),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    /// The cached value regardless of age.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.read_state().map(|(value, _)| value)
    }

    /// True when empty or when the value is at least `ttl` old.
    pub fn is_stale(&self) -> bool {
        match self.read_state() {
            Some((_, fetched_at)) => self.clock.now() - fetched_at >= self.ttl,
            None => true,
        }
    }

    /// Drop the cached value so the next read refetches.
    pub fn invalidate(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = None;
    }

    /// Replace the cached value.
    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = Some(Cached {
            value: value.clone(),
            fetched_at: self.clock.now(),
        });
        value
    }

    /// Return the cached value, refreshing it with `fetch` when stale.
    ///
    /// Errors only surface when nothing has ever been cached.
    pub async fn get_with<F, Fut, E>(&self, fetch: F) -> std::result::Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        if !self.is_stale() {
            if let Some(value) = self.peek() {
                return Ok(value);
            }
        }

        let _guard = match self.peek() {
            Some(stale) => match self.refreshing.try_lock() {
                Ok(guard) => guard,
                // Someone else is refreshing; serve what we have.
                Err(_) => return Ok(stale),
            },
            None => self.refreshing.lock().await,
        };

        // Re-check: the refresh may have completed while we waited.
        if !self.is_stale() {
            if let Some(value) = self.peek() {
                return Ok(value);
            }
        }

        debug!(cache = %self.name, "Refreshing cache");
        match fetch().await {
            Ok(value) => Ok(self.store(value)),
            Err(e) => match self.peek() {
                Some(stale) => {
                    warn!(cache = %self.name, error = %e, "Cache refresh failed; serving stale value");
                    self.mark_attempt();
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Restart the TTL on the current value without replacing it.
    fn mark_attempt(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = state.as_mut() {
            cached.fetched_at = self.clock.now();
        }
    }

    fn read_state(&self) -> Option<(Arc<T>, DateTime<Utc>)> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.as_ref().map(|c| (c.value.clone(), c.fetched_at))
    }
}
