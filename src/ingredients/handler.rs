use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppError,
    ingredients::{prefix_pattern, Ingredient, IngredientFilter},
    response::ApiResponse,
};

/// GET /api/ingredients?name=
pub async fn list_ingredients(
    State(pool): State<PgPool>,
    Query(filter): Query<IngredientFilter>,
) -> Result<impl IntoResponse, AppError> {
    let ingredients = match filter.name.as_deref() {
        Some(name) if !name.trim().is_empty() => {
            sqlx::query_as::<_, Ingredient>(
                "SELECT * FROM ingredients WHERE LOWER(name) LIKE $1 ORDER BY name ASC",
            )
            .bind(prefix_pattern(name))
            .fetch_all(&pool)
            .await?
        }
        _ => {
            sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients ORDER BY name ASC")
                .fetch_all(&pool)
                .await?
        }
    };

    Ok(ApiResponse::success(ingredients))
}

/// GET /api/ingredients/:id
pub async fn get_ingredient(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let ingredient = sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Ingredient not found".to_string()))?;

    Ok(ApiResponse::success(ingredient))
}
