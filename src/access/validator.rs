use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::access_rule::{AccessRule, AccessType, RuleType};

/// Kind of write a rule is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Insert,
    Update,
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Checks a rule before it is written.
///
/// Field checks run in a fixed order and the first failure is returned.
/// Uniqueness is checked last against `existing`, which should hold the
/// stored rules of the same entity type; on update the rule's own row is
/// skipped.
pub fn validate(operation: WriteOperation, rule: &AccessRule, existing: &[AccessRule]) -> AppResult<()> {
    check_fields(rule)?;
    check_unique(operation, rule, existing)
}

pub fn check_fields(rule: &AccessRule) -> AppResult<()> {
    let entity_value = rule.entity_value.as_deref();
    let access_value = rule.access_value.as_deref();

    if rule.entity_type.trim().is_empty() {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleEntityType,
            "entity_type is required",
        ));
    }
    if rule.rule_type == RuleType::EntityType && !is_blank(entity_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleEntityValue,
            "an EntityType rule must not have an entity_value",
        ));
    }
    if rule.rule_type == RuleType::EntityBy && is_blank(entity_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleEntityValue,
            "an EntityBy rule requires an entity_value",
        ));
    }
    if rule.rule_type == RuleType::Entities && !is_blank(entity_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleEntityValue,
            "an Entities rule must not have an entity_value",
        ));
    }
    if rule.access_type == AccessType::All && !is_blank(access_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleAccessValue,
            "an All access rule must not have an access_value",
        ));
    }
    if rule.access_type == AccessType::Identity && is_blank(access_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleAccessValue,
            "an Identity access rule requires an access_value",
        ));
    }
    if rule.access_type == AccessType::IdentityRole && is_blank(access_value) {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleAccessValue,
            "an IdentityRole access rule requires an access_value",
        ));
    }
    if matches!(rule.access_type, AccessType::Identity | AccessType::IdentityRole) {
        let value = access_value.unwrap_or_default().trim();
        if Uuid::parse_str(value).is_err() {
            return Err(AppError::validation(
                ErrorCode::InvalidAccessRuleAccessValue,
                format!("access_value '{value}' is not a valid GUID"),
            ));
        }
    }

    Ok(())
}

pub fn check_unique(operation: WriteOperation, rule: &AccessRule, existing: &[AccessRule]) -> AppResult<()> {
    let duplicate = existing
        .iter()
        .filter(|other| operation == WriteOperation::Insert || other.id != rule.id)
        .any(|other| other.key() == rule.key());

    if duplicate {
        return Err(AppError::validation(
            ErrorCode::InvalidAccessRuleAlreadyExits,
            format!("an access rule for '{}' with the same target already exists", rule.entity_type),
        ));
    }

    Ok(())
}
