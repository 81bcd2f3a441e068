use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::access::Operation;
use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::jwt::MaybeIdentity;
use crate::models::document::{DbDocument, Document, DocumentCreateRequest, DocumentUpdateRequest, DOCUMENT_ENTITY_TYPE};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/documents",
    tag = "Documents",
    responses(
        (status = 200, description = "Documents the caller may read", body = [Document]),
        (status = 403, description = "Listing documents is not permitted"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_documents(State(state): State<AppState>, identity: MaybeIdentity) -> AppResult<Json<Vec<Document>>> {
    state
        .guard
        .ensure(identity.0.as_ref(), DOCUMENT_ENTITY_TYPE, None, Operation::View)
        .await?;

    let rows = sqlx::query_as::<_, DbDocument>(
        "SELECT id, title, body, row_version, created_at, updated_at FROM documents ORDER BY created_at DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let documents = rows
        .into_iter()
        .map(Document::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let documents = state
        .guard
        .retain_permitted(identity.0.as_ref(), DOCUMENT_ENTITY_TYPE, documents, Operation::Read)
        .await?;

    Ok(Json(documents))
}

#[utoipa::path(
    post,
    path = "/documents",
    tag = "Documents",
    request_body = DocumentCreateRequest,
    responses(
        (status = 201, description = "Document created", body = Document),
        (status = 403, description = "Creating documents is not permitted"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_document(
    State(state): State<AppState>,
    identity: MaybeIdentity,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    state
        .guard
        .ensure(identity.0.as_ref(), DOCUMENT_ENTITY_TYPE, None, Operation::Create)
        .await?;

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO documents (id, title, body, row_version, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)")
        .bind(id.to_string())
        .bind(payload.title.trim())
        .bind(&payload.body)
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await?;

    let document = fetch_document(&state.pool, id).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 403, description = "Reading this document is not permitted"),
        (status = 404, description = "Document not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_document(
    State(state): State<AppState>,
    identity: MaybeIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let document = fetch_document(&state.pool, id).await?;
    state
        .guard
        .ensure_item(identity.0.as_ref(), &document, Operation::Read)
        .await?;
    Ok(Json(document))
}

#[utoipa::path(
    put,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentUpdateRequest,
    responses(
        (status = 200, description = "Document updated", body = Document),
        (status = 403, description = "Changing this document is not permitted"),
        (status = 409, description = "Stale row version"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_document(
    State(state): State<AppState>,
    identity: MaybeIdentity,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentUpdateRequest>,
) -> AppResult<Json<Document>> {
    let mut document = fetch_document(&state.pool, id).await?;
    state
        .guard
        .ensure_item(identity.0.as_ref(), &document, Operation::Update)
        .await?;

    if payload.row_version != document.row_version {
        return Err(AppError::conflict("document was modified by someone else"));
    }

    if let Some(title) = payload.title.as_ref() {
        if title.trim().is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        document.title = title.trim().to_string();
    }
    if payload.body.is_some() {
        document.body = payload.body.clone();
    }

    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE documents SET title = ?, body = ?, row_version = row_version + 1, updated_at = ? WHERE id = ? AND row_version = ?",
    )
    .bind(&document.title)
    .bind(&document.body)
    .bind(now)
    .bind(id.to_string())
    .bind(payload.row_version)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::conflict("document was modified by someone else"));
    }

    document.row_version += 1;
    document.updated_at = now;

    Ok(Json(document))
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document deleted"),
        (status = 403, description = "Deleting this document is not permitted"),
        (status = 404, description = "Document not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_document(
    State(state): State<AppState>,
    identity: MaybeIdentity,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let document = fetch_document(&state.pool, id).await?;
    state
        .guard
        .ensure_item(identity.0.as_ref(), &document, Operation::Delete)
        .await?;

    let affected = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("document not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_document(pool: &SqlitePool, id: Uuid) -> AppResult<Document> {
    sqlx::query_as::<_, DbDocument>(
        "SELECT id, title, body, row_version, created_at, updated_at FROM documents WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("document not found"))?
    .try_into()
}
