use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    error::AppError,
    recipes::RecipeSummary,
    response::PageParams,
};

pub mod handler;

/// Public view of a user, as seen by the requester
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    /// Whether the requester follows this user
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: User, is_subscribed: bool) -> Self {
        UserView {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

/// Selects `UserView` columns; `$1` is the viewer id (NULL for anonymous).
pub(crate) const USER_VIEW_SELECT: &str = r#"
    SELECT u.id, u.email, u.username, u.first_name, u.last_name,
           EXISTS (
               SELECT 1 FROM subscriptions s
               WHERE s.user_id = $1 AND s.author_id = u.id
           ) AS is_subscribed
    FROM users u
"#;

/// A followed author together with a preview of their recipes
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Maximum number of recipes listed per author
    pub recipes_limit: Option<i64>,
}

impl SubscriptionParams {
    pub fn page(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Following yourself is never allowed.
pub fn ensure_not_self(user_id: Uuid, author_id: Uuid) -> Result<(), AppError> {
    if user_id == author_id {
        return Err(AppError::BadRequest(
            "You cannot subscribe to yourself".to_string(),
        ));
    }
    Ok(())
}
