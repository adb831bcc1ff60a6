use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    response::IntoResponse,
    Json,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{jwt, utils, SetPassword, User},
    error::AppError,
    permissions::Policy,
    recipes::RecipeSummary,
    relations::SUBSCRIPTIONS,
    response::{ApiResponse, NoContent, Page, PageParams},
    users::{ensure_not_self, SubscriptionParams, SubscriptionView, UserView, USER_VIEW_SELECT},
};

async fn fetch_user_view(
    pool: &PgPool,
    viewer: Option<Uuid>,
    user_id: Uuid,
) -> Result<UserView, AppError> {
    sqlx::query_as::<_, UserView>(&format!("{USER_VIEW_SELECT} WHERE u.id = $2"))
        .bind(viewer)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// List users
/// GET /api/users
pub async fn list_users(
    State(pool): State<PgPool>,
    claims: Option<jwt::Claims>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;

    let users = sqlx::query_as::<_, UserView>(&format!(
        "{USER_VIEW_SELECT} ORDER BY u.created_at ASC, u.id ASC LIMIT $2 OFFSET $3"
    ))
    .bind(viewer)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(Page::new(users, count, &params)))
}

/// Current user
/// GET /api/users/me
pub async fn get_me(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user_view(&pool, Some(claims.sub), claims.sub).await?;
    Ok(ApiResponse::success(user))
}

/// User profile
/// GET /api/users/:id
pub async fn get_user(
    State(pool): State<PgPool>,
    claims: Option<jwt::Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user = fetch_user_view(&pool, claims.map(|c| c.sub), user_id).await?;
    Ok(ApiResponse::success(user))
}

/// Profiles cannot be edited or removed through the API.
/// PATCH, DELETE /api/users/:id
pub async fn modify_user(
    method: Method,
    claims: jwt::Claims,
    Path(user_id): Path<Uuid>,
) -> Result<NoContent, AppError> {
    Policy::ReadOnly.check(&method, Some(claims.sub), user_id)?;
    Ok(NoContent)
}

/// Change the current user's password
/// POST /api/users/set_password
pub async fn set_password(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Json(payload): Json<SetPassword>,
) -> Result<NoContent, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    utils::verify_password(&user.password_hash, &payload.current_password)
        .map_err(|_| AppError::BadRequest("Current password is incorrect".to_string()))?;

    let password_hash = utils::hash_password(&payload.new_password)
        .map_err(|_| AppError::InternalServerError)?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(&pool)
        .await?;

    Ok(NoContent)
}

#[derive(FromRow)]
struct AuthorRecipeRow {
    author_id: Uuid,
    #[sqlx(flatten)]
    recipe: RecipeSummary,
}

#[derive(FromRow)]
struct AuthorCountRow {
    author_id: Uuid,
    recipes_count: i64,
}

/// Attaches recipe previews and counts to a batch of followed authors.
async fn subscription_views(
    pool: &PgPool,
    authors: Vec<UserView>,
    recipes_limit: Option<i64>,
) -> Result<Vec<SubscriptionView>, AppError> {
    let ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();

    let rows = sqlx::query_as::<_, AuthorRecipeRow>(
        r#"
        SELECT author_id, id, name, image, cooking_time
        FROM (
            SELECT r.author_id, r.id, r.name, r.image, r.cooking_time,
                   ROW_NUMBER() OVER (PARTITION BY r.author_id ORDER BY r.created_at DESC) AS rn
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR rn <= $2
        ORDER BY author_id, rn
        "#,
    )
    .bind(&ids)
    .bind(recipes_limit.map(|l| l.max(0)))
    .fetch_all(pool)
    .await?;

    let counts = sqlx::query_as::<_, AuthorCountRow>(
        r#"
        SELECT author_id, COUNT(*) AS recipes_count
        FROM recipes
        WHERE author_id = ANY($1)
        GROUP BY author_id
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut recipes: HashMap<Uuid, Vec<RecipeSummary>> = HashMap::new();
    for row in rows {
        recipes.entry(row.author_id).or_default().push(row.recipe);
    }
    let counts: HashMap<Uuid, i64> = counts
        .into_iter()
        .map(|c| (c.author_id, c.recipes_count))
        .collect();

    Ok(authors
        .into_iter()
        .map(|user| SubscriptionView {
            recipes: recipes.remove(&user.id).unwrap_or_default(),
            recipes_count: counts.get(&user.id).copied().unwrap_or(0),
            user,
        })
        .collect())
}

/// Authors the current user follows
/// GET /api/users/subscriptions
pub async fn list_subscriptions(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Query(params): Query<SubscriptionParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
        .bind(claims.sub)
        .fetch_one(&pool)
        .await?;

    let authors = sqlx::query_as::<_, UserView>(&format!(
        r#"{USER_VIEW_SELECT}
        JOIN subscriptions f ON f.author_id = u.id AND f.user_id = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3"#
    ))
    .bind(claims.sub)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&pool)
    .await?;

    let views = subscription_views(&pool, authors, params.recipes_limit).await?;

    Ok(ApiResponse::success(Page::new(views, count, &page)))
}

/// Follow an author
/// POST /api/users/:id/subscribe
pub async fn subscribe(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(author_id): Path<Uuid>,
    Query(params): Query<SubscriptionParams>,
) -> Result<impl IntoResponse, AppError> {
    let author = fetch_user_view(&pool, Some(claims.sub), author_id).await?;

    ensure_not_self(claims.sub, author_id)?;

    if !SUBSCRIPTIONS.insert(&pool, claims.sub, author_id).await? {
        return Err(AppError::BadRequest(
            "You are already subscribed to this author".to_string(),
        ));
    }

    tracing::info!(user_id = %claims.sub, %author_id, "subscribed");

    let author = UserView {
        is_subscribed: true,
        ..author
    };
    let view = subscription_views(&pool, vec![author], params.recipes_limit)
        .await?
        .pop()
        .ok_or(AppError::InternalServerError)?;

    Ok(ApiResponse::success(view).created())
}

/// Stop following an author
/// DELETE /api/users/:id/subscribe
pub async fn unsubscribe(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(author_id): Path<Uuid>,
) -> Result<NoContent, AppError> {
    fetch_user_view(&pool, Some(claims.sub), author_id).await?;

    if !SUBSCRIPTIONS.delete(&pool, claims.sub, author_id).await? {
        return Err(AppError::BadRequest(
            "You are not subscribed to this author".to_string(),
        ));
    }

    tracing::info!(user_id = %claims.sub, %author_id, "unsubscribed");

    Ok(NoContent)
}
