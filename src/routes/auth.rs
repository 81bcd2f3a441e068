use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::db::accounts;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentIdentity;
use crate::models::identity::{AuthResponse, IdentityAccount, LoginRequest, RegisterRequest};
use crate::utils::{hash_password, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if payload.email.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name and email are required"));
    }

    let password_hash = hash_password(&payload.password)?;
    let db_identity = accounts::insert_identity(&state.pool, &payload.name, &payload.email, &password_hash).await?;
    let identity = db_identity.into_account(Vec::new())?;
    let token = state.jwt.encode(identity.id)?;

    tracing::info!(identity_id = %identity.id, "identity registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, identity })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_identity = accounts::fetch_identity_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_identity.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let id = db_identity.uuid()?;
    let roles = accounts::roles_of(&state.pool, id).await?;
    let token = state.jwt.encode(id)?;
    let identity = db_identity.into_account(roles)?;

    Ok(Json(AuthResponse { token, identity }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current identity", body = IdentityAccount)),
    security(("bearerAuth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> AppResult<Json<IdentityAccount>> {
    let db_identity = accounts::fetch_identity_by_id(&state.pool, identity.id)
        .await?
        .ok_or_else(|| AppError::not_found("identity not found"))?;
    let roles = accounts::roles_of(&state.pool, identity.id).await?;

    Ok(Json(db_identity.into_account(roles)?))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(CurrentIdentity(_identity): CurrentIdentity) -> AppResult<Json<MessageResponse>> {
    // Tokens are stateless; the client drops its copy.
    Ok(Json(MessageResponse {
        message: "logged out".to_string(),
    }))
}
