use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::access::Identity;
use crate::app::AppState;
use crate::db::accounts;
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours))
    }

    pub fn new(secret: impl Into<String>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into().into_bytes()),
            exp_hours,
        }
    }

    pub fn encode(&self, identity_id: Uuid) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let exp = now + Duration::hours(self.exp_hours);

        let claims = Claims {
            sub: identity_id,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Authenticated caller with its current role memberships.
///
/// Roles are read from storage on every request, so grants and revocations
/// take effect without a new token.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;
        let claims = state.jwt.decode(token)?;

        let identity = accounts::load_identity(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("identity no longer exists"))?;

        Ok(CurrentIdentity(identity))
    }
}

/// Like [`CurrentIdentity`] but yields `None` when accounts are switched off.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !state.config.account_on {
            return Ok(MaybeIdentity(None));
        }

        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;
        Ok(MaybeIdentity(Some(identity)))
    }
}

/// Extractor for routes reserved to `SysAdmin` / `AppAdmin`.
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AdminIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;

        if !identity.is_admin() {
            tracing::info!(identity_id = %identity.id, "admin route refused");
            return Err(AppError::forbidden("SysAdmin or AppAdmin role required"));
        }

        Ok(AdminIdentity(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_keeps_subject() {
        let config = JwtConfig::new("test-secret", 1);
        let id = Uuid::new_v4();

        let token = config.encode(id).unwrap();
        assert_eq!(config.decode(&token).unwrap().sub, id);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = JwtConfig::new("one", 1).encode(Uuid::new_v4()).unwrap();
        let err = JwtConfig::new("two", 1).decode(&token).unwrap_err();
        assert!(matches!(err, AppError::Token(_)));
    }
}
