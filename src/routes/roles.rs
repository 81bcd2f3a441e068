//! Role administration
//!
//! Listing, creating and assigning roles is reserved to SysAdmin / AppAdmin.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::accounts;
use crate::errors::{AppError, AppResult};
use crate::jwt::AdminIdentity;
use crate::models::role::{AssignRoleRequest, Role, RoleCreateRequest};

/// List all roles
#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, _admin: AdminIdentity) -> AppResult<Json<Vec<Role>>> {
    Ok(Json(accounts::list_roles(&state.pool).await?))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role designation already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let role = accounts::insert_role(&state.pool, &req.designation, req.description.as_deref()).await?;

    tracing::info!(actor_id = %admin.id, role_id = %role.id, designation = %role.designation, "role created");

    Ok((StatusCode::CREATED, Json(role)))
}

/// Assign a role to an identity
#[utoipa::path(
    post,
    path = "/identities/{identity_id}/roles",
    tag = "Roles",
    params(("identity_id" = Uuid, Path, description = "Identity ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned"),
        (status = 404, description = "Identity or role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path(identity_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<StatusCode> {
    accounts::assign_role(&state.pool, identity_id, req.role_id).await?;

    tracing::info!(actor_id = %admin.id, identity_id = %identity_id, role_id = %req.role_id, "role assigned");

    Ok(StatusCode::CREATED)
}

/// Revoke a role from an identity
#[utoipa::path(
    delete,
    path = "/identities/{identity_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("identity_id" = Uuid, Path, description = "Identity ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 404, description = "Assignment not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Path((identity_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    if !accounts::revoke_role(&state.pool, identity_id, role_id).await? {
        return Err(AppError::not_found("role assignment not found"));
    }

    tracing::info!(actor_id = %admin.id, identity_id = %identity_id, role_id = %role_id, "role revoked");

    Ok(StatusCode::NO_CONTENT)
}
