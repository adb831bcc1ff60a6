//! Membership relations between a user and another row: favorites,
//! shopping carts and author subscriptions all share one shape, a
//! `(owner, target)` pair guarded by a unique constraint.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::AppError, recipes::RecipeSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub target_column: &'static str,
}

pub const FAVORITES: Membership = Membership {
    table: "favorites",
    owner_column: "user_id",
    target_column: "recipe_id",
};

pub const SHOPPING_CARTS: Membership = Membership {
    table: "shopping_carts",
    owner_column: "user_id",
    target_column: "recipe_id",
};

pub const SUBSCRIPTIONS: Membership = Membership {
    table: "subscriptions",
    owner_column: "user_id",
    target_column: "author_id",
};

impl Membership {
    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {table} ({owner}, {target}) VALUES ($1, $2) ON CONFLICT ({owner}, {target}) DO NOTHING",
            table = self.table,
            owner = self.owner_column,
            target = self.target_column,
        )
    }

    fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = $1 AND {} = $2",
            self.table, self.owner_column, self.target_column
        )
    }

    fn exists_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1 AND {} = $2)",
            self.table, self.owner_column, self.target_column
        )
    }

    /// Inserts the pair. Returns `false` when it was already present.
    pub async fn insert(&self, pool: &PgPool, owner: Uuid, target: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&self.insert_sql())
            .bind(owner)
            .bind(target)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Deletes the pair. Returns `false` when there was nothing to delete.
    pub async fn delete(&self, pool: &PgPool, owner: Uuid, target: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&self.delete_sql())
            .bind(owner)
            .bind(target)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn contains(&self, pool: &PgPool, owner: Uuid, target: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(&self.exists_sql())
            .bind(owner)
            .bind(target)
            .fetch_one(pool)
            .await
    }
}

/// The per-user recipe collections that can be toggled from a recipe page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    pub fn membership(self) -> Membership {
        match self {
            RecipeList::Favorites => FAVORITES,
            RecipeList::ShoppingCart => SHOPPING_CARTS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RecipeList::Favorites => "favorites",
            RecipeList::ShoppingCart => "shopping cart",
        }
    }
}

async fn find_recipe(pool: &PgPool, recipe_id: Uuid) -> Result<RecipeSummary, AppError> {
    sqlx::query_as::<_, RecipeSummary>(
        "SELECT id, name, image, cooking_time FROM recipes WHERE id = $1",
    )
    .bind(recipe_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Recipe not found".to_string()))
}

/// A foreign key violation on insert means the recipe row is gone.
fn recipe_insert_error(e: sqlx::Error) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => {
            AppError::NotFound("Recipe not found".to_string())
        }
        _ => AppError::from(e),
    }
}

/// Puts a recipe into one of the user's lists.
pub async fn add_recipe(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<RecipeSummary, AppError> {
    let recipe = find_recipe(pool, recipe_id).await?;

    // the recipe may be deleted between the lookup and the insert
    let inserted = list
        .membership()
        .insert(pool, user_id, recipe_id)
        .await
        .map_err(recipe_insert_error)?;

    if !inserted {
        return Err(AppError::BadRequest(format!(
            "Recipe is already in {}",
            list.label()
        )));
    }

    tracing::info!(%user_id, %recipe_id, list = list.label(), "recipe added");
    Ok(recipe)
}

/// Takes a recipe out of one of the user's lists.
pub async fn remove_recipe(
    pool: &PgPool,
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
) -> Result<(), AppError> {
    find_recipe(pool, recipe_id).await?;

    if !list.membership().delete(pool, user_id, recipe_id).await? {
        return Err(AppError::BadRequest(format!(
            "Recipe is not in {}",
            list.label()
        )));
    }

    tracing::info!(%user_id, %recipe_id, list = list.label(), "recipe removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_relies_on_the_unique_pair() {
        assert_eq!(
            FAVORITES.insert_sql(),
            "INSERT INTO favorites (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT (user_id, recipe_id) DO NOTHING"
        );
    }

    #[test]
    fn subscriptions_target_the_author_column() {
        assert_eq!(
            SUBSCRIPTIONS.delete_sql(),
            "DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2"
        );
        assert_eq!(
            SUBSCRIPTIONS.exists_sql(),
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND author_id = $2)"
        );
    }

    #[test]
    fn recipe_lists_use_distinct_tables() {
        assert_eq!(RecipeList::Favorites.membership().table, "favorites");
        assert_eq!(RecipeList::ShoppingCart.membership().table, "shopping_carts");
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn vanished_recipe_is_not_found(pool: PgPool) {
        let user = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, email, first_name, last_name, password_hash) VALUES ($1, 'reader', 'reader@example.com', 'First', 'Last', 'x')",
        )
        .bind(user)
        .execute(&pool)
        .await
        .unwrap();

        let err = FAVORITES
            .insert(&pool, user, Uuid::new_v4())
            .await
            .map_err(recipe_insert_error)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
