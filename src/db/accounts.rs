use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::access::Identity;
use crate::errors::{AppError, AppResult};
use crate::models::identity::DbIdentity;
use crate::models::role::{DbRole, Role};

const SELECT_IDENTITY: &str = "SELECT id, name, email, password_hash, created_at, updated_at FROM identities";
const SELECT_ROLE: &str = "SELECT id, designation, description, created_at, updated_at FROM roles";

// =============================================================================
// IDENTITIES
// =============================================================================

pub async fn fetch_identity_by_id(pool: &SqlitePool, id: Uuid) -> AppResult<Option<DbIdentity>> {
    Ok(sqlx::query_as::<_, DbIdentity>(&format!("{SELECT_IDENTITY} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?)
}

pub async fn fetch_identity_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbIdentity>> {
    Ok(sqlx::query_as::<_, DbIdentity>(&format!("{SELECT_IDENTITY} WHERE lower(email) = lower(?)"))
        .bind(email.trim())
        .fetch_optional(pool)
        .await?)
}

pub async fn insert_identity(pool: &SqlitePool, name: &str, email: &str, password_hash: &str) -> AppResult<DbIdentity> {
    if fetch_identity_by_email(pool, email).await?.is_some() {
        return Err(AppError::conflict("email already in use"));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO identities (id, name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name.trim())
    .bind(email.trim())
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    fetch_identity_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("identity missing after insert"))
}

/// Loads the identity together with its role memberships, as the evaluator sees it.
pub async fn load_identity(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Identity>> {
    if fetch_identity_by_id(pool, id).await?.is_none() {
        return Ok(None);
    }

    let roles = roles_of(pool, id).await?;
    let identity = Identity::new(id)
        .with_roles(roles.iter().map(|role| role.id))
        .with_role_names(roles.into_iter().map(|role| role.designation));

    Ok(Some(identity))
}

// =============================================================================
// ROLES
// =============================================================================

fn into_roles(rows: Vec<DbRole>) -> AppResult<Vec<Role>> {
    rows.into_iter().map(Role::try_from).collect()
}

pub async fn list_roles(pool: &SqlitePool) -> AppResult<Vec<Role>> {
    let rows = sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} ORDER BY designation"))
        .fetch_all(pool)
        .await?;
    into_roles(rows)
}

pub async fn fetch_role(pool: &SqlitePool, id: Uuid) -> AppResult<Option<Role>> {
    sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?
        .map(Role::try_from)
        .transpose()
}

pub async fn fetch_role_by_designation(pool: &SqlitePool, designation: &str) -> AppResult<Option<Role>> {
    sqlx::query_as::<_, DbRole>(&format!("{SELECT_ROLE} WHERE designation = ?"))
        .bind(designation.trim())
        .fetch_optional(pool)
        .await?
        .map(Role::try_from)
        .transpose()
}

pub async fn insert_role(pool: &SqlitePool, designation: &str, description: Option<&str>) -> AppResult<Role> {
    let designation = designation.trim();
    if designation.is_empty() {
        return Err(AppError::bad_request("designation is required"));
    }
    if fetch_role_by_designation(pool, designation).await?.is_some() {
        return Err(AppError::conflict(format!("role '{designation}' already exists")));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query("INSERT INTO roles (id, designation, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(designation)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(Role {
        id,
        designation: designation.to_string(),
        description: description.map(String::from),
        created_at: now,
        updated_at: now,
    })
}

pub async fn roles_of(pool: &SqlitePool, identity_id: Uuid) -> AppResult<Vec<Role>> {
    let rows = sqlx::query_as::<_, DbRole>(
        r#"
        SELECT r.id, r.designation, r.description, r.created_at, r.updated_at
        FROM roles r
        INNER JOIN identity_roles ir ON r.id = ir.role_id
        WHERE ir.identity_id = ?
        ORDER BY r.designation
        "#,
    )
    .bind(identity_id.to_string())
    .fetch_all(pool)
    .await?;

    into_roles(rows)
}

pub async fn assign_role(pool: &SqlitePool, identity_id: Uuid, role_id: Uuid) -> AppResult<()> {
    if fetch_identity_by_id(pool, identity_id).await?.is_none() {
        return Err(AppError::not_found("identity not found"));
    }
    if fetch_role(pool, role_id).await?.is_none() {
        return Err(AppError::not_found("role not found"));
    }

    sqlx::query("INSERT OR IGNORE INTO identity_roles (identity_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(identity_id.to_string())
        .bind(role_id.to_string())
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn grant_role_by_designation(pool: &SqlitePool, identity_id: Uuid, designation: &str) -> AppResult<Role> {
    let role = fetch_role_by_designation(pool, designation)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role '{designation}' not found")))?;
    assign_role(pool, identity_id, role.id).await?;
    Ok(role)
}

pub async fn revoke_role(pool: &SqlitePool, identity_id: Uuid, role_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM identity_roles WHERE identity_id = ? AND role_id = ?")
        .bind(identity_id.to_string())
        .bind(role_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
