use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::cache::RuleStore;
use super::identity::{AccessTarget, Identity};
use super::matcher::{PrecedenceMatcher, RuleMatcher};
use crate::errors::AppResult;
use crate::models::access_rule::{AccessRule, RuleType};

/// CRUD operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    View,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::View => "view",
        }
    }

    /// The flag of `rule` that governs this operation.
    pub fn permits(&self, rule: &AccessRule) -> bool {
        match self {
            Operation::Create => rule.creatable,
            Operation::Read => rule.readable,
            Operation::Update => rule.updatable,
            Operation::Delete => rule.deletable,
            Operation::View => rule.viewable,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "read" => Ok(Operation::Read),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "view" => Ok(Operation::View),
            other => Err(format!("unknown operation: {other}")),
        }
    }
}

/// Three-tier access rule evaluator
///
/// Tiers, each a gate that must pass:
/// 1. `EntityType` rules (type-wide)
/// 2. `Entities` rules (collection-wide), skipped for create
/// 3. `EntityBy` rules whose entity value is the instance id, only when an instance is given
///
/// A tier without rules passes. A tier with rules passes only if the
/// decisive rule picked by the [`RuleMatcher`] grants the operation.
#[derive(Clone)]
pub struct AccessEvaluator {
    store: Arc<RuleStore>,
    matcher: Arc<dyn RuleMatcher>,
}

impl AccessEvaluator {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self {
            store,
            matcher: Arc::new(PrecedenceMatcher::new()),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn RuleMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub async fn is_permitted(
        &self,
        entity_type: &str,
        instance: Option<&str>,
        operation: Operation,
        identity: &Identity,
    ) -> AppResult<bool> {
        let rules = self.store.rules_for_entity_type(entity_type).await?;
        let permitted = self.decide(&rules, instance, operation, identity);

        tracing::debug!(
            identity_id = %identity.id,
            entity_type = %entity_type,
            instance = ?instance,
            operation = %operation,
            permitted,
            "access rules evaluated"
        );

        Ok(permitted)
    }

    /// Runs the gates over an already loaded rule set of one entity type.
    pub fn decide(&self, rules: &[AccessRule], instance: Option<&str>, operation: Operation, identity: &Identity) -> bool {
        let type_access = self.gate(rules, RuleType::EntityType, None, operation, identity);
        match operation {
            Operation::Create => type_access,
            _ => {
                type_access
                    && self.gate(rules, RuleType::Entities, None, operation, identity)
                    && instance.map_or(true, |id| {
                        self.gate(rules, RuleType::EntityBy, Some(id), operation, identity)
                    })
            }
        }
    }

    fn gate(
        &self,
        rules: &[AccessRule],
        tier: RuleType,
        entity_value: Option<&str>,
        operation: Operation,
        identity: &Identity,
    ) -> bool {
        let tier_rules: Vec<&AccessRule> = rules
            .iter()
            .filter(|rule| rule.rule_type == tier)
            .filter(|rule| entity_value.map_or(true, |value| rule.entity_value.as_deref() == Some(value)))
            .collect();

        if tier_rules.is_empty() {
            return true;
        }

        self.matcher
            .decisive(&tier_rules, identity)
            .is_some_and(|rule| operation.permits(rule))
    }

    pub async fn can_be_created(&self, entity_type: &str, identity: &Identity) -> AppResult<bool> {
        self.is_permitted(entity_type, None, Operation::Create, identity).await
    }

    /// Type and collection gates for listing, against the `viewable` flag.
    pub async fn can_be_viewed(&self, entity_type: &str, identity: &Identity) -> AppResult<bool> {
        self.is_permitted(entity_type, None, Operation::View, identity).await
    }

    pub async fn can_be_read<T: AccessTarget + ?Sized>(&self, item: &T, identity: &Identity) -> AppResult<bool> {
        self.check_item(item, Operation::Read, identity).await
    }

    pub async fn can_be_changed<T: AccessTarget + ?Sized>(&self, item: &T, identity: &Identity) -> AppResult<bool> {
        self.check_item(item, Operation::Update, identity).await
    }

    pub async fn can_be_deleted<T: AccessTarget + ?Sized>(&self, item: &T, identity: &Identity) -> AppResult<bool> {
        self.check_item(item, Operation::Delete, identity).await
    }

    async fn check_item<T: AccessTarget + ?Sized>(
        &self,
        item: &T,
        operation: Operation,
        identity: &Identity,
    ) -> AppResult<bool> {
        let id = item.identifier();
        self.is_permitted(item.entity_type_name(), Some(&id), operation, identity)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::cache::CachePolicy;
    use crate::access::identity::EntityRef;
    use crate::access::source::MemoryRuleSource;
    use crate::models::access_rule::AccessType;
    use uuid::Uuid;

    const DOC: &str = "Document";

    fn evaluator(rules: Vec<AccessRule>) -> AccessEvaluator {
        let source = Arc::new(MemoryRuleSource::with_rules(rules));
        AccessEvaluator::new(Arc::new(RuleStore::new(source, CachePolicy::Session)))
    }

    fn deny_all() -> (bool, bool, bool, bool, bool) {
        (false, false, false, false, false)
    }

    fn flags(rule: AccessRule, f: (bool, bool, bool, bool, bool)) -> AccessRule {
        rule.with_flags(f.0, f.1, f.2, f.3, f.4)
    }

    #[tokio::test]
    async fn test_no_rules_permits_everything() {
        let evaluator = evaluator(vec![]);
        let identity = Identity::new(Uuid::new_v4());
        let item = EntityRef::new(DOC, Uuid::new_v4().to_string());

        assert!(evaluator.can_be_created(DOC, &identity).await.unwrap());
        assert!(evaluator.can_be_read(&item, &identity).await.unwrap());
        assert!(evaluator.can_be_changed(&item, &identity).await.unwrap());
        assert!(evaluator.can_be_deleted(&item, &identity).await.unwrap());
        assert!(evaluator.can_be_viewed(DOC, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_rules_for_other_types_do_not_apply() {
        let evaluator = evaluator(vec![flags(
            AccessRule::new(RuleType::EntityType, "Invoice", AccessType::All),
            deny_all(),
        )]);
        let identity = Identity::new(Uuid::new_v4());

        assert!(evaluator.can_be_created(DOC, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_rule_overrides_all_rule() {
        let identity = Identity::new(Uuid::new_v4());
        let evaluator = evaluator(vec![
            AccessRule::new(RuleType::EntityType, DOC, AccessType::All),
            flags(
                AccessRule::new(RuleType::EntityType, DOC, AccessType::Identity)
                    .with_access_value(identity.id.to_string()),
                deny_all(),
            ),
        ]);

        assert!(!evaluator.can_be_created(DOC, &identity).await.unwrap());

        let someone_else = Identity::new(Uuid::new_v4());
        assert!(evaluator.can_be_created(DOC, &someone_else).await.unwrap());
    }

    #[tokio::test]
    async fn test_rules_present_but_none_matching_denies() {
        let evaluator = evaluator(vec![AccessRule::new(RuleType::EntityType, DOC, AccessType::Identity)
            .with_access_value(Uuid::new_v4().to_string())]);
        let identity = Identity::new(Uuid::new_v4());

        assert!(!evaluator.can_be_created(DOC, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_instance_rule_denies_read_despite_type_grant() {
        let identity = Identity::new(Uuid::new_v4());
        let locked = Uuid::new_v4().to_string();
        let evaluator = evaluator(vec![
            AccessRule::new(RuleType::EntityType, DOC, AccessType::All),
            flags(
                AccessRule::new(RuleType::EntityBy, DOC, AccessType::All).with_entity_value(locked.clone()),
                (true, false, true, true, true),
            ),
        ]);

        let item = EntityRef::new(DOC, locked);
        assert!(!evaluator.can_be_read(&item, &identity).await.unwrap());
        assert!(evaluator.can_be_changed(&item, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_instance_rule_leaves_other_instances_alone() {
        let identity = Identity::new(Uuid::new_v4());
        let evaluator = evaluator(vec![flags(
            AccessRule::new(RuleType::EntityBy, DOC, AccessType::All).with_entity_value(Uuid::new_v4().to_string()),
            deny_all(),
        )]);

        let other = EntityRef::new(DOC, Uuid::new_v4().to_string());
        assert!(evaluator.can_be_read(&other, &identity).await.unwrap());
        assert!(evaluator.can_be_deleted(&other, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_collection_rule_gates_read_but_not_create() {
        let identity = Identity::new(Uuid::new_v4());
        let evaluator = evaluator(vec![flags(
            AccessRule::new(RuleType::Entities, DOC, AccessType::All),
            deny_all(),
        )]);

        let item = EntityRef::new(DOC, Uuid::new_v4().to_string());
        assert!(evaluator.can_be_created(DOC, &identity).await.unwrap());
        assert!(!evaluator.can_be_read(&item, &identity).await.unwrap());
        assert!(!evaluator.can_be_viewed(DOC, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_role_rule_grants_delete() {
        let role = Uuid::new_v4();
        let member = Identity::new(Uuid::new_v4()).with_roles(vec![role]);
        let outsider = Identity::new(Uuid::new_v4());
        let evaluator = evaluator(vec![
            flags(AccessRule::new(RuleType::EntityType, DOC, AccessType::All), deny_all()),
            AccessRule::new(RuleType::EntityType, DOC, AccessType::IdentityRole).with_access_value(role.to_string()),
        ]);

        let item = EntityRef::new(DOC, Uuid::new_v4().to_string());
        assert!(evaluator.can_be_deleted(&item, &member).await.unwrap());
        assert!(!evaluator.can_be_deleted(&item, &outsider).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_role_rule_fails_closed_without_error() {
        let role = Uuid::new_v4();
        let identity = Identity::new(Uuid::new_v4()).with_roles(vec![role]);
        let evaluator = evaluator(vec![AccessRule::new(RuleType::EntityType, DOC, AccessType::IdentityRole)
            .with_access_value("{broken")]);

        assert!(!evaluator.can_be_created(DOC, &identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_operation_flags_are_independent() {
        let identity = Identity::new(Uuid::new_v4());
        let evaluator = evaluator(vec![flags(
            AccessRule::new(RuleType::EntityType, DOC, AccessType::All),
            (false, true, false, true, false),
        )]);
        let item = EntityRef::new(DOC, "42");

        assert!(!evaluator.can_be_created(DOC, &identity).await.unwrap());
        assert!(evaluator.can_be_read(&item, &identity).await.unwrap());
        assert!(!evaluator.can_be_changed(&item, &identity).await.unwrap());
        assert!(evaluator.can_be_deleted(&item, &identity).await.unwrap());
        assert!(!evaluator.can_be_viewed(DOC, &identity).await.unwrap());
    }

    #[test]
    fn test_operation_parses_case_insensitively() {
        assert_eq!("Delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("archive".parse::<Operation>().is_err());
    }
}
