//! Quota guard: admission control for metered tools.
//!
//! Usage is counted per `(user, plan, period)` in a [`CounterStore`]. Crossing
//! into a new period simply starts a new counter key, so nothing has to be
//! swept or reset.
//!
//! `check` is advisory and never writes. `consume` is the only mutation and
//! goes through the store's guarded increment, so concurrent requests from
//! the same user cannot push usage past the limit. Call it only after the
//! metered work has succeeded.

use chrono::Utc;
use prepwise_config::{QuotaConfig, QuotaLimits, QuotaPeriod};
use prepwise_core::clock::{Clock, SystemClock};
use prepwise_core::error::StoreError;
use prepwise_core::event::{DomainEvent, EventBus};
use prepwise_core::plan::Plan;
use prepwise_core::store::{CounterStore, IncrementOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a quota check or consume. Returned to callers instead of an
/// error so they can degrade gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub limit: u64,
    pub message: String,
}

/// Snapshot of one user's usage in the current period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: String,
    pub plan: Plan,
    pub period_key: String,
    pub used: u64,
    pub limit: u64,
}

pub struct QuotaGuard {
    counters: Arc<dyn CounterStore>,
    metric: String,
    limits: QuotaLimits,
    period: QuotaPeriod,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
}

impl QuotaGuard {
    pub fn new(counters: Arc<dyn CounterStore>, metric: impl Into<String>, config: &QuotaConfig) -> Self {
        Self {
            counters,
            metric: metric.into(),
            limits: config.limits,
            period: config.period,
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn limit_for(&self, plan: Plan) -> u64 {
        self.limits.for_plan(plan)
    }

    fn period_key(&self) -> String {
        self.period.period_key(self.clock.now())
    }

    fn counter_key(&self, user_id: &str, plan: Plan, period_key: &str) -> String {
        format!("quota:{}:{user_id}:{plan}:{period_key}", self.metric)
    }

    fn period_label(&self) -> &'static str {
        match self.period {
            QuotaPeriod::Daily => "today",
            QuotaPeriod::Monthly => "this month",
        }
    }

    fn decide(&self, plan: Plan, used: u64, units: u64) -> QuotaDecision {
        let limit = self.limit_for(plan);
        let remaining = limit.saturating_sub(used);
        let allowed = limit > 0 && units <= remaining;

        let message = if limit == 0 {
            format!("{} is not available on the {plan} plan", self.metric)
        } else if allowed {
            format!(
                "{remaining} of {limit} {} units left {}",
                self.metric,
                self.period_label()
            )
        } else {
            format!(
                "{} quota reached: {used} of {limit} used {}, {remaining} remaining",
                self.metric,
                self.period_label()
            )
        };

        QuotaDecision {
            allowed,
            remaining,
            limit,
            message,
        }
    }

    /// Whether `units` more would fit. Never writes.
    pub async fn check(
        &self,
        user_id: &str,
        plan: Plan,
        units: u64,
    ) -> Result<QuotaDecision, StoreError> {
        let key = self.counter_key(user_id, plan, &self.period_key());
        let used = self.counters.read(&key).await?;
        Ok(self.decide(plan, used, units))
    }

    /// Atomically charge `units`. Rejected (and unchanged) if they don't fit.
    pub async fn consume(
        &self,
        user_id: &str,
        plan: Plan,
        units: u64,
    ) -> Result<QuotaDecision, StoreError> {
        let limit = self.limit_for(plan);
        let key = self.counter_key(user_id, plan, &self.period_key());

        if limit == 0 {
            let used = self.counters.read(&key).await?;
            return Ok(self.decide(plan, used, units));
        }

        match self.counters.try_increment(&key, units, limit).await? {
            IncrementOutcome::Applied { used } => {
                let decision = self.decide(plan, used, 0);
                debug!(user_id, metric = %self.metric, units, remaining = decision.remaining, "Quota consumed");
                if let Some(events) = &self.events {
                    events.publish(DomainEvent::QuotaConsumed {
                        user_id: user_id.to_string(),
                        metric: self.metric.clone(),
                        units,
                        remaining: decision.remaining,
                        timestamp: Utc::now(),
                    });
                }
                Ok(decision)
            }
            IncrementOutcome::Rejected { used } => {
                info!(user_id, metric = %self.metric, units, used, limit, "Quota consume rejected");
                Ok(self.decide(plan, used, units))
            }
        }
    }

    /// Current usage for the active period.
    pub async fn record(&self, user_id: &str, plan: Plan) -> Result<QuotaRecord, StoreError> {
        let period_key = self.period_key();
        let used = self
            .counters
            .read(&self.counter_key(user_id, plan, &period_key))
            .await?;
        Ok(QuotaRecord {
            user_id: user_id.to_string(),
            plan,
            period_key,
            used,
            limit: self.limit_for(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use prepwise_core::clock::ManualClock;
    use prepwise_store::InMemoryStore;

    fn config(pro: u64) -> QuotaConfig {
        QuotaConfig {
            period: QuotaPeriod::Daily,
            limits: QuotaLimits {
                free: 0,
                pro,
                max: 100,
            },
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 10, 23, 0, 0).unwrap(),
        ))
    }

    fn guard(pro: u64, clock: Arc<ManualClock>) -> QuotaGuard {
        QuotaGuard::new(Arc::new(InMemoryStore::new()), "crawl", &config(pro)).with_clock(clock)
    }

    #[tokio::test]
    async fn check_has_no_side_effects() {
        let guard = guard(5, clock());
        for _ in 0..10 {
            let d = guard.check("u1", Plan::Pro, 1).await.unwrap();
            assert!(d.allowed);
            assert_eq!(d.remaining, 5);
        }
        assert_eq!(guard.record("u1", Plan::Pro).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn exhausted_after_limit_consumed() {
        let guard = guard(5, clock());
        let d = guard.consume("u1", Plan::Pro, 5).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);

        let d = guard.check("u1", Plan::Pro, 1).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.limit, 5);
        assert!(d.message.contains("5 of 5"));
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_change() {
        let guard = guard(5, clock());
        guard.consume("u1", Plan::Pro, 3).await.unwrap();
        let d = guard.consume("u1", Plan::Pro, 3).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 2);
        assert_eq!(guard.record("u1", Plan::Pro).await.unwrap().used, 3);
    }

    #[tokio::test]
    async fn free_plan_has_no_allowance() {
        let guard = guard(5, clock());
        let d = guard.check("u1", Plan::Free, 1).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.limit, 0);
        assert!(d.message.contains("FREE"));
        assert!(!guard.consume("u1", Plan::Free, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let guard = guard(2, clock());
        guard.consume("alice", Plan::Pro, 2).await.unwrap();
        assert!(guard.check("bob", Plan::Pro, 2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn new_period_starts_fresh() {
        let clock = clock();
        let guard = guard(3, clock.clone());
        guard.consume("u1", Plan::Pro, 3).await.unwrap();
        assert!(!guard.check("u1", Plan::Pro, 1).await.unwrap().allowed);

        clock.advance(Duration::hours(2));
        let record = guard.record("u1", Plan::Pro).await.unwrap();
        assert_eq!(record.period_key, "2026-04-11");
        assert_eq!(record.used, 0);
        assert!(guard.check("u1", Plan::Pro, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn consume_publishes_event() {
        let events = Arc::new(EventBus::new(8));
        let mut rx = events.subscribe();
        let guard = guard(5, clock()).with_events(events);
        guard.consume("u1", Plan::Pro, 2).await.unwrap();

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::QuotaConsumed { units, remaining, .. } => {
                assert_eq!(*units, 2);
                assert_eq!(*remaining, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_exceed_limit() {
        let guard = Arc::new(guard(5, clock()));
        let a = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.consume("u1", Plan::Pro, 3).await.unwrap() })
        };
        let b = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.consume("u1", Plan::Pro, 3).await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.allowed ^ b.allowed, "exactly one consume must succeed");
        assert_eq!(guard.record("u1", Plan::Pro).await.unwrap().used, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn limit_plus_one_units_in_parallel() {
        let guard = Arc::new(guard(5, clock()));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let guard = guard.clone();
            handles.push(tokio::spawn(async move {
                guard.consume("u1", Plan::Pro, 1).await.unwrap()
            }));
        }
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
        let record = guard.record("u1", Plan::Pro).await.unwrap();
        assert_eq!(record.used, 5);
        assert!(record.used <= record.limit);
    }
}
