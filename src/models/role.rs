use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    #[schema(example = "AppAdmin")]
    pub designation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub designation: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: Uuid::parse_str(&db.id).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?,
            designation: db.designation,
            description: db.description,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Editor")]
    pub designation: String,
    #[schema(example = "Can edit documents")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}
