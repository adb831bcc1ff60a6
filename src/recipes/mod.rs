use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, media, response::PageParams, tags::Tag, users::UserView};

pub mod handler;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub author_id: Uuid,
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Short recipe representation used by favorites, carts and subscriptions
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecipeSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(serialize_with = "media::serialize_url")]
    pub image: String,
    pub cooking_time: i32,
}

/// One ingredient line in a recipe payload
#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecipe {
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Uuid>,
    pub image: String,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Name must be between 1 and 200 characters"
    ))]
    pub name: String,
    #[validate(length(min = 1, message = "Text cannot be empty"))]
    pub text: String,
    #[validate(range(min = 1, message = "Cooking time must be at least 1 minute"))]
    pub cooking_time: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecipe {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<Uuid>>,
    pub image: Option<String>,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Name must be between 1 and 200 characters"
    ))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Text cannot be empty"))]
    pub text: Option<String>,
    #[validate(range(min = 1, message = "Cooking time must be at least 1 minute"))]
    pub cooking_time: Option<i32>,
}

/// Checks the ingredient lines of a recipe payload.
pub fn validate_ingredients(lines: &[IngredientAmount]) -> Result<(), AppError> {
    if lines.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "A recipe needs at least one ingredient".to_string(),
        ));
    }
    if lines.iter().any(|line| line.amount < 1) {
        return Err(AppError::UnprocessableEntity(
            "Ingredient amount must be at least 1".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(lines.len());
    if !lines.iter().all(|line| seen.insert(line.id)) {
        return Err(AppError::UnprocessableEntity(
            "Ingredients must not repeat".to_string(),
        ));
    }
    Ok(())
}

/// Checks the tag ids of a recipe payload.
pub fn validate_tags(tags: &[Uuid]) -> Result<(), AppError> {
    if tags.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "A recipe needs at least one tag".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(tags.len());
    if !tags.iter().all(|id| seen.insert(*id)) {
        return Err(AppError::UnprocessableEntity(
            "Tags must not repeat".to_string(),
        ));
    }
    Ok(())
}

impl CreateRecipe {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        validate_ingredients(&self.ingredients)?;
        validate_tags(&self.tags)
    }
}

impl UpdateRecipe {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        if let Some(ingredients) = &self.ingredients {
            validate_ingredients(ingredients)?;
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecipeIngredientView {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// Full recipe representation, with flags relative to the viewer
#[derive(Debug, Serialize)]
pub struct RecipeView {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    #[serde(serialize_with = "media::serialize_url")]
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Query parameters for the recipe listing. `tags` may repeat.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_favorited: Option<u8>,
    pub is_in_shopping_cart: Option<u8>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl RecipeFilter {
    pub fn favorited_only(&self) -> bool {
        self.is_favorited == Some(1)
    }

    pub fn in_shopping_cart_only(&self) -> bool {
        self.is_in_shopping_cart == Some(1)
    }

    pub fn page(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CreateRecipe {
        CreateRecipe {
            ingredients: vec![
                IngredientAmount {
                    id: Uuid::new_v4(),
                    amount: 200,
                },
                IngredientAmount {
                    id: Uuid::new_v4(),
                    amount: 2,
                },
            ],
            tags: vec![Uuid::new_v4()],
            image: "data:image/png;base64,AAAA".to_string(),
            name: "Блины".to_string(),
            text: "Смешать и пожарить".to_string(),
            cooking_time: 30,
        }
    }

    #[test]
    fn accepts_a_well_formed_recipe() {
        assert!(payload().check().is_ok());
    }

    #[test]
    fn rejects_repeated_ingredients() {
        let mut recipe = payload();
        let first = recipe.ingredients[0].clone();
        recipe.ingredients.push(first);
        assert!(recipe.check().is_err());
    }

    #[test]
    fn rejects_non_positive_amounts_and_cooking_time() {
        let mut recipe = payload();
        recipe.ingredients[1].amount = 0;
        assert!(recipe.check().is_err());

        let mut recipe = payload();
        recipe.cooking_time = 0;
        assert!(recipe.check().is_err());
    }

    #[test]
    fn rejects_empty_or_repeated_tags() {
        let mut recipe = payload();
        recipe.tags.clear();
        assert!(recipe.check().is_err());

        let mut recipe = payload();
        recipe.tags.push(recipe.tags[0]);
        assert!(recipe.check().is_err());
    }

    #[test]
    fn partial_update_only_checks_present_fields() {
        let update = UpdateRecipe {
            ingredients: None,
            tags: None,
            image: None,
            name: Some("Оладьи".to_string()),
            text: None,
            cooking_time: None,
        };
        assert!(update.check().is_ok());

        let update = UpdateRecipe {
            tags: Some(Vec::new()),
            ..update
        };
        assert!(update.check().is_err());
    }

    #[test]
    fn summary_exposes_media_url() {
        let summary = RecipeSummary {
            id: Uuid::nil(),
            name: "Блины".to_string(),
            image: "recipes/images/a.png".to_string(),
            cooking_time: 30,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["image"], "/media/recipes/images/a.png");
    }

    #[test]
    fn filter_flags_require_one() {
        let filter = RecipeFilter {
            is_favorited: Some(1),
            is_in_shopping_cart: Some(0),
            ..RecipeFilter::default()
        };
        assert!(filter.favorited_only());
        assert!(!filter.in_shopping_cart_only());
    }
}
