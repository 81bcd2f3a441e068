use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::AccessTarget;
use crate::errors::AppError;

/// Entity type name access rules use for documents.
pub const DOCUMENT_ENTITY_TYPE: &str = "Document";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub body: Option<String>,
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessTarget for Document {
    fn entity_type_name(&self) -> &str {
        DOCUMENT_ENTITY_TYPE
    }

    fn identifier(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub row_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDocument> for Document {
    type Error = AppError;

    fn try_from(value: DbDocument) -> Result<Self, Self::Error> {
        Ok(Document {
            id: Uuid::parse_str(&value.id).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?,
            title: value.title,
            body: value.body,
            row_version: value.row_version,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "Quarterly report")]
    pub title: String,
    #[schema(example = "Numbers are up.")]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    #[schema(example = "Quarterly report (final)")]
    pub title: Option<String>,
    pub body: Option<String>,
    #[schema(example = 1)]
    pub row_version: i64,
}
