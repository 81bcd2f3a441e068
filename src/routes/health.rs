use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;
use sqlx::query_scalar;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// Access rule enforcement mode: off, advisory or strict
    pub access_rules: String,
    pub rule_cache: String,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    // Lightweight DB check
    let db_check = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;
    let (db_ok, db_error) = match db_check {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    };

    Ok(Json(HealthResponse {
        status: "ok",
        db_ok,
        db_error,
        access_rules: state.config.access_rules.to_string(),
        rule_cache: state.rules.policy().to_string(),
    }))
}
