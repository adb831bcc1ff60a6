use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::Method,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::Query;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    auth::jwt,
    config::settings::Settings,
    error::AppError,
    media,
    permissions::Policy,
    recipes::{
        CreateRecipe, IngredientAmount, Recipe, RecipeFilter, RecipeIngredientView, RecipeView,
        UpdateRecipe,
    },
    relations::{self, RecipeList},
    response::{ApiResponse, NoContent, Page},
    tags::Tag,
    users::UserView,
};

/// Helper struct for fetching a recipe with its author and viewer flags
#[derive(FromRow)]
struct RecipeFromDb {
    id: Uuid,
    name: String,
    text: String,
    image: String,
    cooking_time: i32,
    // author fields
    author_id: Uuid,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    is_subscribed: bool,
    // viewer flags
    is_favorited: bool,
    is_in_shopping_cart: bool,
}

#[derive(FromRow)]
struct RecipeTagRow {
    recipe_id: Uuid,
    #[sqlx(flatten)]
    tag: Tag,
}

#[derive(FromRow)]
struct RecipeIngredientRow {
    recipe_id: Uuid,
    #[sqlx(flatten)]
    ingredient: RecipeIngredientView,
}

/// Loads full recipe views for `ids`, preserving their order.
async fn load_recipe_views(
    pool: &PgPool,
    viewer: Option<Uuid>,
    ids: &[Uuid],
) -> Result<Vec<RecipeView>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, RecipeFromDb>(
        r#"
        SELECT
            r.id, r.name, r.text, r.image, r.cooking_time,
            u.id AS author_id, u.email, u.username, u.first_name, u.last_name,
            EXISTS (
                SELECT 1 FROM subscriptions s WHERE s.user_id = $2 AND s.author_id = u.id
            ) AS is_subscribed,
            EXISTS (
                SELECT 1 FROM favorites f WHERE f.user_id = $2 AND f.recipe_id = r.id
            ) AS is_favorited,
            EXISTS (
                SELECT 1 FROM shopping_carts c WHERE c.user_id = $2 AND c.recipe_id = r.id
            ) AS is_in_shopping_cart
        FROM recipes r
        JOIN users u ON r.author_id = u.id
        WHERE r.id = ANY($1)
        "#,
    )
    .bind(ids)
    .bind(viewer)
    .fetch_all(pool)
    .await?;

    let tag_rows = sqlx::query_as::<_, RecipeTagRow>(
        r#"
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        JOIN tags t ON rt.tag_id = t.id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name ASC
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let ingredient_rows = sqlx::query_as::<_, RecipeIngredientRow>(
        r#"
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON ri.ingredient_id = i.id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY i.name ASC
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for row in tag_rows {
        tags.entry(row.recipe_id).or_default().push(row.tag);
    }
    let mut ingredients: HashMap<Uuid, Vec<RecipeIngredientView>> = HashMap::new();
    for row in ingredient_rows {
        ingredients
            .entry(row.recipe_id)
            .or_default()
            .push(row.ingredient);
    }

    let mut by_id: HashMap<Uuid, RecipeFromDb> = rows.into_iter().map(|r| (r.id, r)).collect();

    Ok(ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .map(|r| RecipeView {
            id: r.id,
            tags: tags.remove(&r.id).unwrap_or_default(),
            author: UserView {
                id: r.author_id,
                email: r.email,
                username: r.username,
                first_name: r.first_name,
                last_name: r.last_name,
                is_subscribed: r.is_subscribed,
            },
            ingredients: ingredients.remove(&r.id).unwrap_or_default(),
            is_favorited: r.is_favorited,
            is_in_shopping_cart: r.is_in_shopping_cart,
            name: r.name,
            image: r.image,
            text: r.text,
            cooking_time: r.cooking_time,
        })
        .collect())
}

async fn load_recipe_view(
    pool: &PgPool,
    viewer: Option<Uuid>,
    id: Uuid,
) -> Result<RecipeView, AppError> {
    load_recipe_views(pool, viewer, &[id])
        .await?
        .pop()
        .ok_or(AppError::NotFound("Recipe not found".to_string()))
}

/// Appends the listing filters to a query over `recipes r`.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter, viewer: Option<Uuid>) {
    qb.push(" WHERE TRUE");

    if let Some(author) = filter.author {
        qb.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM recipe_tags rt JOIN tags t ON rt.tag_id = t.id \
             WHERE rt.recipe_id = r.id AND t.slug = ANY(",
        )
        .push_bind(filter.tags.clone())
        .push("))");
    }

    for (only, table) in [
        (filter.favorited_only(), "favorites"),
        (filter.in_shopping_cart_only(), "shopping_carts"),
    ] {
        if !only {
            continue;
        }
        match viewer {
            Some(user_id) => {
                qb.push(format!(
                    " AND EXISTS (SELECT 1 FROM {table} m WHERE m.recipe_id = r.id AND m.user_id = "
                ))
                .push_bind(user_id)
                .push(")");
            }
            // anonymous viewers have no favorites or cart
            None => {
                qb.push(" AND FALSE");
            }
        }
    }
}

/// List recipes
/// GET /api/recipes?author=&tags=&tags=&is_favorited=1&is_in_shopping_cart=1
pub async fn list_recipes(
    State(pool): State<PgPool>,
    claims: Option<jwt::Claims>,
    Query(filter): Query<RecipeFilter>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = claims.map(|c| c.sub);
    let page = filter.page();

    let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM recipes r");
    push_filters(&mut count_query, &filter, viewer);
    let count: i64 = count_query.build_query_scalar().fetch_one(&pool).await?;

    let mut ids_query = QueryBuilder::new("SELECT r.id FROM recipes r");
    push_filters(&mut ids_query, &filter, viewer);
    ids_query
        .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let ids: Vec<Uuid> = ids_query.build_query_scalar().fetch_all(&pool).await?;

    let recipes = load_recipe_views(&pool, viewer, &ids).await?;

    Ok(ApiResponse::success(Page::new(recipes, count, &page)))
}

/// GET /api/recipes/:id
pub async fn get_recipe(
    State(pool): State<PgPool>,
    claims: Option<jwt::Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let recipe = load_recipe_view(&pool, claims.map(|c| c.sub), id).await?;
    Ok(ApiResponse::success(recipe))
}

/// Replaces the ingredient lines of a recipe, rejecting unknown ingredients.
async fn write_ingredients(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    lines: &[IngredientAmount],
) -> Result<(), AppError> {
    let ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    let amounts: Vec<i32> = lines.iter().map(|l| l.amount).collect();

    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&mut **tx)
        .await?;
    if known != ids.len() as i64 {
        return Err(AppError::BadRequest("Unknown ingredient".to_string()));
    }

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount)
        SELECT $1, line.ingredient_id, line.amount
        FROM UNNEST($2::uuid[], $3::int4[]) AS line (ingredient_id, amount)
        "#,
    )
    .bind(recipe_id)
    .bind(&ids)
    .bind(&amounts)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Replaces the tag set of a recipe, rejecting unknown tags.
async fn write_tags(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Uuid,
    tags: &[Uuid],
) -> Result<(), AppError> {
    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(tags)
        .fetch_one(&mut **tx)
        .await?;
    if known != tags.len() as i64 {
        return Err(AppError::BadRequest("Unknown tag".to_string()));
    }

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, tag_id FROM UNNEST($2::uuid[]) AS tag_id",
    )
    .bind(recipe_id)
    .bind(tags)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Writes a new recipe with its lines and tags in one transaction.
async fn insert_recipe(
    pool: &PgPool,
    author_id: Uuid,
    payload: &CreateRecipe,
    image: &str,
) -> Result<Uuid, AppError> {
    let mut tx = pool.begin().await?;

    let recipe = sqlx::query_as::<_, Recipe>(
        r#"
        INSERT INTO recipes (author_id, name, text, image, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(author_id)
    .bind(&payload.name)
    .bind(&payload.text)
    .bind(image)
    .bind(payload.cooking_time)
    .fetch_one(&mut *tx)
    .await?;

    write_ingredients(&mut tx, recipe.id, &payload.ingredients).await?;
    write_tags(&mut tx, recipe.id, &payload.tags).await?;

    tx.commit().await?;

    Ok(recipe.id)
}

/// POST /api/recipes
pub async fn create_recipe(
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    claims: jwt::Claims,
    Json(payload): Json<CreateRecipe>,
) -> Result<impl IntoResponse, AppError> {
    payload.check()?;

    let image = media::save_recipe_image(&settings.media_root, &payload.image).await?;

    let recipe_id = match insert_recipe(&pool, claims.sub, &payload, &image).await {
        Ok(id) => id,
        Err(e) => {
            media::remove(&settings.media_root, &image).await;
            return Err(e);
        }
    };

    tracing::info!(%recipe_id, author_id = %claims.sub, "recipe created");

    let view = load_recipe_view(&pool, Some(claims.sub), recipe_id).await?;
    Ok(ApiResponse::success(view).created())
}

/// PATCH /api/recipes/:id
pub async fn update_recipe(
    method: Method,
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecipe>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let recipe = sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Recipe not found".to_string()))?;

    Policy::OwnerOnly.check(&method, Some(claims.sub), recipe.author_id)?;

    payload.check()?;

    let new_image = match &payload.image {
        Some(uri) => Some(media::save_recipe_image(&settings.media_root, uri).await?),
        None => None,
    };

    let written = async {
        sqlx::query(
            r#"
            UPDATE recipes SET
                name = COALESCE($1, name),
                text = COALESCE($2, text),
                image = COALESCE($3, image),
                cooking_time = COALESCE($4, cooking_time)
            WHERE id = $5
            "#,
        )
        .bind(&payload.name)
        .bind(&payload.text)
        .bind(&new_image)
        .bind(payload.cooking_time)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(lines) = &payload.ingredients {
            write_ingredients(&mut tx, id, lines).await?;
        }
        if let Some(tags) = &payload.tags {
            write_tags(&mut tx, id, tags).await?;
        }

        tx.commit().await?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = written {
        if let Some(image) = &new_image {
            media::remove(&settings.media_root, image).await;
        }
        return Err(e);
    }

    if new_image.is_some() {
        media::remove(&settings.media_root, &recipe.image).await;
    }

    tracing::info!(recipe_id = %id, "recipe updated");

    let view = load_recipe_view(&pool, Some(claims.sub), id).await?;
    Ok(ApiResponse::success(view))
}

/// DELETE /api/recipes/:id
pub async fn delete_recipe(
    method: Method,
    State(pool): State<PgPool>,
    State(settings): State<Settings>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
) -> Result<NoContent, AppError> {
    let recipe = sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Recipe not found".to_string()))?;

    Policy::OwnerOnly.check(&method, Some(claims.sub), recipe.author_id)?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    media::remove(&settings.media_root, &recipe.image).await;

    tracing::info!(recipe_id = %id, "recipe deleted");

    Ok(NoContent)
}

/// POST /api/recipes/:id/favorite
pub async fn add_favorite(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let recipe = relations::add_recipe(&pool, RecipeList::Favorites, claims.sub, id).await?;
    Ok(ApiResponse::success(recipe).created())
}

/// DELETE /api/recipes/:id/favorite
pub async fn remove_favorite(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
) -> Result<NoContent, AppError> {
    relations::remove_recipe(&pool, RecipeList::Favorites, claims.sub, id).await?;
    Ok(NoContent)
}

/// POST /api/recipes/:id/shopping_cart
pub async fn add_to_shopping_cart(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let recipe = relations::add_recipe(&pool, RecipeList::ShoppingCart, claims.sub, id).await?;
    Ok(ApiResponse::success(recipe).created())
}

/// DELETE /api/recipes/:id/shopping_cart
pub async fn remove_from_shopping_cart(
    State(pool): State<PgPool>,
    claims: jwt::Claims,
    Path(id): Path<Uuid>,
) -> Result<NoContent, AppError> {
    relations::remove_recipe(&pool, RecipeList::ShoppingCart, claims.sub, id).await?;
    Ok(NoContent)
}
