use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::users::UserView;

pub mod handler;
pub mod jwt;
pub mod utils;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Usernames are restricted to letters, digits and `.@+-_`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '@' | '+' | '-' | '_'))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username")
            .with_message("Username contains an invalid character".into()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUser {
    #[validate(
        length(
            min = 1,
            max = 150,
            message = "Username must be between 1 and 150 characters"
        ),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(
        email(message = "Invalid email format"),
        length(max = 254, message = "Email must be at most 254 characters")
    )]
    pub email: String,
    #[validate(length(
        min = 1,
        max = 150,
        message = "First name must be between 1 and 150 characters"
    ))]
    pub first_name: String,
    #[validate(length(
        min = 1,
        max = 150,
        message = "Last name must be between 1 and 150 characters"
    ))]
    pub last_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPassword {
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str) -> RegisterUser {
        RegisterUser {
            username: username.to_string(),
            email: "cook@example.com".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Petrova".to_string(),
            password: "long-enough".to_string(),
        }
    }

    #[test]
    fn accepts_usernames_with_allowed_punctuation() {
        assert!(registration("chef.anna+1@home_made-food").validate().is_ok());
        assert!(registration("повар").validate().is_ok());
    }

    #[test]
    fn rejects_usernames_with_spaces_or_symbols() {
        assert!(registration("chef anna").validate().is_err());
        assert!(registration("chef#1").validate().is_err());
        assert!(registration("").validate().is_err());
    }

    #[test]
    fn rejects_short_passwords() {
        let mut payload = registration("chef");
        payload.password = "short".to_string();
        assert!(payload.validate().is_err());
    }
}
