use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::access_rule::{AccessRule, DbAccessRule};

const SELECT_RULES: &str = "SELECT id, rule_type, entity_type, relationship_entity_type, property_name, entity_value, access_type, access_role_type, access_value, creatable, readable, updatable, deletable, viewable, row_version, created_at, updated_at FROM access_rules";

/// A write that lost the race against an identical rule trips the key index.
fn map_key_violation(err: sqlx::Error, rule: &AccessRule) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::validation(
                ErrorCode::InvalidAccessRuleAlreadyExits,
                format!("an access rule for '{}' with the same target already exists", rule.entity_type),
            );
        }
    }
    AppError::Database(err)
}

fn into_rules(rows: Vec<DbAccessRule>) -> AppResult<Vec<AccessRule>> {
    rows.into_iter().map(AccessRule::try_from).collect()
}

pub async fn fetch_by_entity_type(pool: &SqlitePool, entity_type: &str) -> AppResult<Vec<AccessRule>> {
    let rows = sqlx::query_as::<_, DbAccessRule>(&format!(
        "{SELECT_RULES} WHERE entity_type = ? ORDER BY created_at, id"
    ))
    .bind(entity_type)
    .fetch_all(pool)
    .await?;

    into_rules(rows)
}

pub async fn fetch_all(pool: &SqlitePool) -> AppResult<Vec<AccessRule>> {
    let rows = sqlx::query_as::<_, DbAccessRule>(&format!(
        "{SELECT_RULES} ORDER BY entity_type, created_at, id"
    ))
    .fetch_all(pool)
    .await?;

    into_rules(rows)
}

pub async fn fetch_by_id(pool: &SqlitePool, id: Uuid) -> AppResult<Option<AccessRule>> {
    sqlx::query_as::<_, DbAccessRule>(&format!("{SELECT_RULES} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .map(AccessRule::try_from)
        .transpose()
}

pub async fn insert(pool: &SqlitePool, rule: &AccessRule) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO access_rules (id, rule_type, entity_type, relationship_entity_type, property_name, entity_value, access_type, access_role_type, access_value, creatable, readable, updatable, deletable, viewable, row_version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(rule.id.to_string())
    .bind(rule.rule_type.as_str())
    .bind(&rule.entity_type)
    .bind(&rule.relationship_entity_type)
    .bind(&rule.property_name)
    .bind(&rule.entity_value)
    .bind(rule.access_type.as_str())
    .bind(&rule.access_role_type)
    .bind(&rule.access_value)
    .bind(rule.creatable)
    .bind(rule.readable)
    .bind(rule.updatable)
    .bind(rule.deletable)
    .bind(rule.viewable)
    .bind(rule.row_version)
    .bind(rule.created_at)
    .bind(rule.updated_at)
    .execute(pool)
    .await
    .map_err(|err| map_key_violation(err, rule))?;

    Ok(())
}

/// Writes `rule` if the stored row still has `expected_version`.
/// Returns `false` when the row is gone or was changed in the meantime.
pub async fn update(pool: &SqlitePool, rule: &AccessRule, expected_version: i64) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE access_rules SET rule_type = ?, entity_type = ?, relationship_entity_type = ?, property_name = ?, entity_value = ?, access_type = ?, access_role_type = ?, access_value = ?, creatable = ?, readable = ?, updatable = ?, deletable = ?, viewable = ?, row_version = ?, updated_at = ? WHERE id = ? AND row_version = ?",
    )
    .bind(rule.rule_type.as_str())
    .bind(&rule.entity_type)
    .bind(&rule.relationship_entity_type)
    .bind(&rule.property_name)
    .bind(&rule.entity_value)
    .bind(rule.access_type.as_str())
    .bind(&rule.access_role_type)
    .bind(&rule.access_value)
    .bind(rule.creatable)
    .bind(rule.readable)
    .bind(rule.updatable)
    .bind(rule.deletable)
    .bind(rule.viewable)
    .bind(rule.row_version)
    .bind(rule.updated_at)
    .bind(rule.id.to_string())
    .bind(expected_version)
    .execute(pool)
    .await
    .map_err(|err| map_key_violation(err, rule))?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &SqlitePool, id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM access_rules WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
