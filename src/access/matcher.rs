use uuid::Uuid;

use super::identity::Identity;
use crate::models::access_rule::{AccessRule, AccessType};

/// Picks the rule that decides access for an identity among the rules of one tier
pub trait RuleMatcher: Send + Sync {
    /// `None` means no rule applies to the identity.
    fn decisive<'a>(&self, tier_rules: &[&'a AccessRule], identity: &Identity) -> Option<&'a AccessRule>;
}

/// Standard precedence: `All`, then `Identity`, then `IdentityRole`.
/// Each later match overrides the earlier one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecedenceMatcher;

impl PrecedenceMatcher {
    pub fn new() -> Self {
        Self
    }

    fn access_guid(rule: &AccessRule) -> Option<Uuid> {
        let value = rule.access_value.as_deref()?;
        match Uuid::parse_str(value.trim()) {
            Ok(guid) => Some(guid),
            Err(err) => {
                tracing::warn!(
                    rule_id = %rule.id,
                    access_type = %rule.access_type,
                    access_value = %value,
                    error = %err,
                    "skipping access rule with malformed access value"
                );
                None
            }
        }
    }
}

impl RuleMatcher for PrecedenceMatcher {
    fn decisive<'a>(&self, tier_rules: &[&'a AccessRule], identity: &Identity) -> Option<&'a AccessRule> {
        let mut decisive = None;

        if let Some(rule) = tier_rules.iter().find(|r| r.access_type == AccessType::All) {
            decisive = Some(*rule);
        }

        if let Some(rule) = tier_rules.iter().find(|r| {
            r.access_type == AccessType::Identity && Self::access_guid(r) == Some(identity.id)
        }) {
            decisive = Some(*rule);
        }

        if let Some(rule) = tier_rules.iter().find(|r| {
            r.access_type == AccessType::IdentityRole
                && Self::access_guid(r).is_some_and(|role| identity.has_role(&role))
        }) {
            decisive = Some(*rule);
        }

        decisive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_rule::RuleType;

    fn rule(access_type: AccessType) -> AccessRule {
        AccessRule::new(RuleType::EntityType, "Document", access_type)
    }

    #[test]
    fn test_no_rules_no_match() {
        let identity = Identity::new(Uuid::new_v4());
        assert!(PrecedenceMatcher::new().decisive(&[], &identity).is_none());
    }

    #[test]
    fn test_identity_rule_overrides_all() {
        let identity = Identity::new(Uuid::new_v4());
        let all = rule(AccessType::All);
        let mine = rule(AccessType::Identity).with_access_value(identity.id.to_string());

        let picked = PrecedenceMatcher::new().decisive(&[&mine, &all], &identity);
        assert_eq!(picked.map(|r| r.id), Some(mine.id));
    }

    #[test]
    fn test_role_rule_overrides_identity() {
        let role = Uuid::new_v4();
        let identity = Identity::new(Uuid::new_v4()).with_roles(vec![role]);
        let mine = rule(AccessType::Identity).with_access_value(identity.id.to_string());
        let by_role = rule(AccessType::IdentityRole).with_access_value(role.to_string());

        let picked = PrecedenceMatcher::new().decisive(&[&by_role, &mine], &identity);
        assert_eq!(picked.map(|r| r.id), Some(by_role.id));
    }

    #[test]
    fn test_rules_for_others_do_not_match() {
        let identity = Identity::new(Uuid::new_v4()).with_roles(vec![Uuid::new_v4()]);
        let other = rule(AccessType::Identity).with_access_value(Uuid::new_v4().to_string());
        let other_role = rule(AccessType::IdentityRole).with_access_value(Uuid::new_v4().to_string());

        assert!(PrecedenceMatcher::new()
            .decisive(&[&other, &other_role], &identity)
            .is_none());
    }

    #[test]
    fn test_identity_value_compares_case_insensitively() {
        let identity = Identity::new(Uuid::new_v4());
        let mine = rule(AccessType::Identity).with_access_value(identity.id.to_string().to_uppercase());

        assert!(PrecedenceMatcher::new().decisive(&[&mine], &identity).is_some());
    }

    #[test]
    fn test_malformed_role_value_is_skipped() {
        let role = Uuid::new_v4();
        let identity = Identity::new(Uuid::new_v4()).with_roles(vec![role]);
        let broken = rule(AccessType::IdentityRole).with_access_value("not-a-guid");
        let all = rule(AccessType::All);

        let picked = PrecedenceMatcher::new().decisive(&[&broken, &all], &identity);
        assert_eq!(picked.map(|r| r.id), Some(all.id));
    }

    #[test]
    fn test_entity_and_custom_role_rules_are_ignored() {
        let identity = Identity::new(Uuid::new_v4());
        let entity = rule(AccessType::Entity).with_access_value(identity.id.to_string());
        let custom = rule(AccessType::CustomRole);

        assert!(PrecedenceMatcher::new()
            .decisive(&[&entity, &custom], &identity)
            .is_none());
    }
}
