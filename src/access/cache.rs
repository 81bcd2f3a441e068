use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::source::RuleSource;
use crate::errors::AppResult;
use crate::models::access_rule::AccessRule;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How long a loaded rule set stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never expires; lives as long as the store
    Session,
    /// Reloaded once older than the given duration
    TimeBoxed(Duration),
    /// Every lookup goes to the source
    Disabled,
}

impl CachePolicy {
    fn is_fresh(&self, loaded_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            CachePolicy::Session => true,
            CachePolicy::TimeBoxed(ttl) => now - loaded_at < *ttl,
            CachePolicy::Disabled => false,
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Session => f.write_str("session"),
            CachePolicy::TimeBoxed(ttl) => write!(f, "{}s", ttl.num_seconds()),
            CachePolicy::Disabled => f.write_str("disabled"),
        }
    }
}

struct CachedRules {
    rules: Arc<Vec<AccessRule>>,
    loaded_at: DateTime<Utc>,
}

/// Cached rule sets plus invalidation counters. A load may only publish its
/// result if neither counter moved while it ran.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedRules>,
    generations: HashMap<String, u64>,
    epoch: u64,
}

impl CacheState {
    fn generation(&self, entity_type: &str) -> (u64, u64) {
        (self.epoch, self.generations.get(entity_type).copied().unwrap_or(0))
    }
}

/// Per-entity-type rule cache in front of a [`RuleSource`].
///
/// The map lock is never held while the source is queried, so two concurrent
/// misses for the same type may both load; the later insert wins. A load
/// that overlaps an `invalidate` or `clear` is returned to its caller but
/// not cached.
pub struct RuleStore {
    source: Arc<dyn RuleSource>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl RuleStore {
    pub fn new(source: Arc<dyn RuleSource>, policy: CachePolicy) -> Self {
        Self {
            source,
            policy,
            clock: Arc::new(SystemClock),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub async fn rules_for_entity_type(&self, entity_type: &str) -> AppResult<Arc<Vec<AccessRule>>> {
        let mut started = (0, 0);
        if self.policy != CachePolicy::Disabled {
            let now = self.clock.now();
            let state = self.state.lock().await;
            if let Some(entry) = state.entries.get(entity_type) {
                if self.policy.is_fresh(entry.loaded_at, now) {
                    return Ok(Arc::clone(&entry.rules));
                }
            }
            started = state.generation(entity_type);
        }

        let rules = Arc::new(self.source.rules_for_entity_type(entity_type).await?);
        tracing::debug!(
            entity_type = %entity_type,
            count = rules.len(),
            policy = %self.policy,
            "loaded access rules"
        );

        if self.policy != CachePolicy::Disabled {
            let mut state = self.state.lock().await;
            if state.generation(entity_type) == started {
                let cached = CachedRules {
                    rules: Arc::clone(&rules),
                    loaded_at: self.clock.now(),
                };
                state.entries.insert(entity_type.to_string(), cached);
            } else {
                tracing::debug!(entity_type = %entity_type, "rules changed during load, result not cached");
            }
        }

        Ok(rules)
    }

    /// Drops the cached rules of one entity type, including any load in flight.
    pub async fn invalidate(&self, entity_type: &str) {
        let mut state = self.state.lock().await;
        *state.generations.entry(entity_type.to_string()).or_insert(0) += 1;
        if state.entries.remove(entity_type).is_some() {
            tracing::debug!(entity_type = %entity_type, "access rule cache entry invalidated");
        }
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        state.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::source::MemoryRuleSource;
    use crate::errors::AppError;
    use crate::models::access_rule::{AccessType, RuleType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn source_with_one_rule() -> Arc<MemoryRuleSource> {
        Arc::new(MemoryRuleSource::with_rules(vec![AccessRule::new(
            RuleType::EntityType,
            "Document",
            AccessType::All,
        )]))
    }

    #[tokio::test]
    async fn test_session_policy_loads_once() {
        let source = source_with_one_rule();
        let store = RuleStore::new(source.clone(), CachePolicy::Session);

        let first = store.rules_for_entity_type("Document").await.unwrap();
        let second = store.rules_for_entity_type("Document").await.unwrap();

        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.load_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_entity_type() {
        let source = source_with_one_rule();
        let store = RuleStore::new(source.clone(), CachePolicy::Session);

        assert_eq!(store.rules_for_entity_type("Document").await.unwrap().len(), 1);
        assert!(store.rules_for_entity_type("Invoice").await.unwrap().is_empty());
        assert_eq!(source.load_count(), 2);
    }

    #[tokio::test]
    async fn test_time_boxed_policy_reloads_after_expiry() {
        let source = source_with_one_rule();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = RuleStore::new(source.clone(), CachePolicy::TimeBoxed(Duration::seconds(30)))
            .with_clock(clock.clone());

        store.rules_for_entity_type("Document").await.unwrap();
        clock.advance(Duration::seconds(29));
        store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(source.load_count(), 1);

        source
            .insert(AccessRule::new(RuleType::Entities, "Document", AccessType::All))
            .await;
        clock.advance(Duration::seconds(1));
        let rules = store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(source.load_count(), 2);
        assert_eq!(rules.len(), 2);
    }

    #[tokio::test]
    async fn test_session_policy_stays_stale() {
        let source = source_with_one_rule();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = RuleStore::new(source.clone(), CachePolicy::Session).with_clock(clock.clone());

        store.rules_for_entity_type("Document").await.unwrap();
        source
            .insert(AccessRule::new(RuleType::Entities, "Document", AccessType::All))
            .await;
        clock.advance(Duration::days(365));

        assert_eq!(store.rules_for_entity_type("Document").await.unwrap().len(), 1);
        assert_eq!(source.load_count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_policy_always_loads() {
        let source = source_with_one_rule();
        let store = RuleStore::new(source.clone(), CachePolicy::Disabled);

        store.rules_for_entity_type("Document").await.unwrap();
        store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(source.load_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let source = source_with_one_rule();
        let store = RuleStore::new(source.clone(), CachePolicy::Session);

        store.rules_for_entity_type("Document").await.unwrap();
        store.invalidate("Document").await;
        store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(source.load_count(), 2);

        store.clear().await;
        store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(source.load_count(), 3);
    }

    /// Serves a snapshot taken before it blocks, so a write can land mid-load.
    struct GatedSource {
        inner: MemoryRuleSource,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RuleSource for GatedSource {
        async fn rules_for_entity_type(&self, entity_type: &str) -> AppResult<Vec<AccessRule>> {
            let rules = self.inner.rules_for_entity_type(entity_type).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(rules)
        }
    }

    fn gated_source() -> Arc<GatedSource> {
        Arc::new(GatedSource {
            inner: MemoryRuleSource::with_rules(vec![AccessRule::new(
                RuleType::EntityType,
                "Document",
                AccessType::All,
            )]),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    #[tokio::test]
    async fn test_invalidate_during_load_is_not_lost() {
        let source = gated_source();
        let store = Arc::new(RuleStore::new(source.clone(), CachePolicy::Session));

        let loading = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.rules_for_entity_type("Document").await })
        };

        source.entered.notified().await;
        source
            .inner
            .insert(AccessRule::new(RuleType::Entities, "Document", AccessType::All))
            .await;
        store.invalidate("Document").await;
        source.release.notify_one();

        let stale = loading.await.unwrap().unwrap();
        assert_eq!(stale.len(), 1);

        let fresh = store.rules_for_entity_type("Document").await.unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_during_load_is_not_lost() {
        let source = gated_source();
        let store = Arc::new(RuleStore::new(source.clone(), CachePolicy::Session));

        let loading = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.rules_for_entity_type("Document").await })
        };

        source.entered.notified().await;
        source
            .inner
            .insert(AccessRule::new(RuleType::Entities, "Document", AccessType::All))
            .await;
        store.clear().await;
        source.release.notify_one();
        loading.await.unwrap().unwrap();

        assert_eq!(store.rules_for_entity_type("Document").await.unwrap().len(), 2);
    }

    struct FailingSource;

    #[async_trait]
    impl RuleSource for FailingSource {
        async fn rules_for_entity_type(&self, _entity_type: &str) -> AppResult<Vec<AccessRule>> {
            Err(AppError::internal("storage offline"))
        }
    }

    #[tokio::test]
    async fn test_source_errors_propagate() {
        let store = RuleStore::new(Arc::new(FailingSource), CachePolicy::Session);

        let err = store.rules_for_entity_type("Document").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
