//! Access rule administration API
//!
//! Every write is validated (field invariants, then uniqueness against the
//! stored rules of the same entity type) and drops the affected cache entries.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::access::validator::{self, WriteOperation};
use crate::app::AppState;
use crate::db::access_rules;
use crate::errors::{AppError, AppResult};
use crate::jwt::AdminIdentity;
use crate::models::access_rule::{AccessRule, AccessRuleQuery, AccessRuleRequest};
use crate::utils::{normalize, utc_now};

fn rule_from_request(req: AccessRuleRequest, id: Uuid, row_version: i64, created_at: DateTime<Utc>) -> AccessRule {
    let mut rule = AccessRule {
        id,
        rule_type: req.rule_type,
        entity_type: req.entity_type.trim().to_string(),
        relationship_entity_type: normalize(req.relationship_entity_type),
        property_name: normalize(req.property_name),
        entity_value: normalize(req.entity_value),
        access_type: req.access_type,
        access_role_type: normalize(req.access_role_type),
        access_value: normalize(req.access_value),
        creatable: req.creatable,
        readable: req.readable,
        updatable: req.updatable,
        deletable: req.deletable,
        viewable: req.viewable,
        row_version,
        created_at,
        updated_at: utc_now(),
    };
    rule.access_value = rule.canonical_access_value();
    rule
}

async fn fetch_rule(state: &AppState, id: Uuid) -> AppResult<AccessRule> {
    access_rules::fetch_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("access rule not found"))
}

/// List access rules
#[utoipa::path(
    get,
    path = "/access-rules",
    tag = "Access Rules",
    params(AccessRuleQuery),
    responses((status = 200, description = "Access rules", body = Vec<AccessRule>)),
    security(("bearerAuth" = []))
)]
pub async fn list_rules(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Query(query): Query<AccessRuleQuery>,
) -> AppResult<Json<Vec<AccessRule>>> {
    let rules = match normalize(query.entity_type) {
        Some(entity_type) => access_rules::fetch_by_entity_type(&state.pool, &entity_type).await?,
        None => access_rules::fetch_all(&state.pool).await?,
    };

    Ok(Json(rules))
}

/// Create an access rule
#[utoipa::path(
    post,
    path = "/access-rules",
    tag = "Access Rules",
    request_body = AccessRuleRequest,
    responses(
        (status = 201, description = "Access rule created", body = AccessRule),
        (status = 400, description = "Rule violates an invariant", body = crate::errors::ErrorResponse),
        (status = 409, description = "An equal rule already exists", body = crate::errors::ErrorResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_rule(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Json(req): Json<AccessRuleRequest>,
) -> AppResult<(StatusCode, Json<AccessRule>)> {
    let now = utc_now();
    let rule = rule_from_request(req, Uuid::new_v4(), 1, now);

    let existing = access_rules::fetch_by_entity_type(&state.pool, &rule.entity_type).await?;
    validator::validate(WriteOperation::Insert, &rule, &existing)?;

    access_rules::insert(&state.pool, &rule).await?;
    state.rules.invalidate(&rule.entity_type).await;

    tracing::info!(
        actor_id = %admin.id,
        rule_id = %rule.id,
        entity_type = %rule.entity_type,
        rule_type = %rule.rule_type,
        access_type = %rule.access_type,
        "access rule created"
    );

    Ok((StatusCode::CREATED, Json(rule)))
}

/// Get an access rule by ID
#[utoipa::path(
    get,
    path = "/access-rules/{id}",
    tag = "Access Rules",
    params(("id" = Uuid, Path, description = "Access rule ID")),
    responses(
        (status = 200, description = "Access rule", body = AccessRule),
        (status = 404, description = "Access rule not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_rule(
    State(state): State<AppState>,
    _admin: AdminIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AccessRule>> {
    Ok(Json(fetch_rule(&state, id).await?))
}

/// Replace an access rule
#[utoipa::path(
    put,
    path = "/access-rules/{id}",
    tag = "Access Rules",
    params(("id" = Uuid, Path, description = "Access rule ID")),
    request_body = AccessRuleRequest,
    responses(
        (status = 200, description = "Access rule updated", body = AccessRule),
        (status = 400, description = "Rule violates an invariant", body = crate::errors::ErrorResponse),
        (status = 404, description = "Access rule not found"),
        (status = 409, description = "Stale row version or duplicate rule", body = crate::errors::ErrorResponse),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_rule(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path(id): Path<Uuid>,
    Json(req): Json<AccessRuleRequest>,
) -> AppResult<Json<AccessRule>> {
    let current = fetch_rule(&state, id).await?;
    let expected_version = req
        .row_version
        .ok_or_else(|| AppError::bad_request("row_version is required for updates"))?;
    if expected_version != current.row_version {
        return Err(AppError::conflict("access rule was modified by someone else"));
    }

    let rule = rule_from_request(req, id, current.row_version + 1, current.created_at);

    let existing = access_rules::fetch_by_entity_type(&state.pool, &rule.entity_type).await?;
    validator::validate(WriteOperation::Update, &rule, &existing)?;

    if !access_rules::update(&state.pool, &rule, expected_version).await? {
        return Err(AppError::conflict("access rule was modified by someone else"));
    }

    state.rules.invalidate(&current.entity_type).await;
    state.rules.invalidate(&rule.entity_type).await;

    tracing::info!(
        actor_id = %admin.id,
        rule_id = %rule.id,
        entity_type = %rule.entity_type,
        row_version = rule.row_version,
        "access rule updated"
    );

    Ok(Json(rule))
}

/// Delete an access rule
#[utoipa::path(
    delete,
    path = "/access-rules/{id}",
    tag = "Access Rules",
    params(("id" = Uuid, Path, description = "Access rule ID")),
    responses(
        (status = 204, description = "Access rule deleted"),
        (status = 404, description = "Access rule not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let rule = fetch_rule(&state, id).await?;

    if !access_rules::delete(&state.pool, id).await? {
        return Err(AppError::not_found("access rule not found"));
    }
    state.rules.invalidate(&rule.entity_type).await;

    tracing::info!(actor_id = %admin.id, rule_id = %id, entity_type = %rule.entity_type, "access rule deleted");

    Ok(StatusCode::NO_CONTENT)
}
