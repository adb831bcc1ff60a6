use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::jwt,
    error::AppError,
    shopping_list::{render, ShoppingListLine, FILENAME},
};

/// Sums ingredient amounts over the user's cart, grouped by name and unit.
pub async fn aggregate(pool: &PgPool, user_id: Uuid) -> Result<Vec<ShoppingListLine>, AppError> {
    let lines = sqlx::query_as::<_, ShoppingListLine>(
        r#"
        SELECT i.name, i.measurement_unit, SUM(ri.amount)::BIGINT AS total_amount
        FROM shopping_carts c
        JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
        GROUP BY i.name, i.measurement_unit
        ORDER BY i.name ASC, i.measurement_unit ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(lines)
}

/// Download the shopping list as a text attachment
/// GET /api/recipes/download_shopping_cart
pub async fn download_shopping_cart(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let lines = aggregate(&pool, claims.sub).await?;

    tracing::debug!(user_id = %claims.sub, items = lines.len(), "shopping list built");

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{FILENAME}\""),
            ),
        ],
        render(&lines),
    ))
}
