use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::access_rules;
use crate::errors::AppResult;
use crate::models::access_rule::AccessRule;

/// Where the rule store loads rules from
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// All rules whose `entity_type` equals `entity_type`, in storage order.
    async fn rules_for_entity_type(&self, entity_type: &str) -> AppResult<Vec<AccessRule>>;
}

/// Rules persisted in the `access_rules` table
#[derive(Debug, Clone)]
pub struct SqliteRuleSource {
    pool: SqlitePool,
}

impl SqliteRuleSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleSource for SqliteRuleSource {
    async fn rules_for_entity_type(&self, entity_type: &str) -> AppResult<Vec<AccessRule>> {
        access_rules::fetch_by_entity_type(&self.pool, entity_type).await
    }
}

/// In-process rule source. Counts loads so callers can observe cache behavior.
#[derive(Debug, Default)]
pub struct MemoryRuleSource {
    rules: RwLock<Vec<AccessRule>>,
    loads: AtomicUsize,
}

impl MemoryRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = AccessRule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().collect()),
            loads: AtomicUsize::new(0),
        }
    }

    pub async fn insert(&self, rule: AccessRule) {
        self.rules.write().await.push(rule);
    }

    /// Number of `rules_for_entity_type` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleSource for MemoryRuleSource {
    async fn rules_for_entity_type(&self, entity_type: &str) -> AppResult<Vec<AccessRule>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rules = self.rules.read().await;
        Ok(rules
            .iter()
            .filter(|rule| rule.entity_type == entity_type)
            .cloned()
            .collect())
    }
}
