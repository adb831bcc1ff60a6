use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppError, response::ApiResponse, tags::Tag};

/// GET /api/tags
pub async fn list_tags(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let tags = sqlx::query_as::<_, Tag>("SELECT * FROM tags ORDER BY name ASC")
        .fetch_all(&pool)
        .await?;

    Ok(ApiResponse::success(tags))
}

/// GET /api/tags/:id
pub async fn get_tag(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tag = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Tag not found".to_string()))?;

    Ok(ApiResponse::success(tag))
}
