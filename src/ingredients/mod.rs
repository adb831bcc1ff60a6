use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod handler;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Deserialize)]
pub struct IngredientFilter {
    pub name: Option<String>,
}

/// Builds a case-insensitive `LIKE` pattern matching names that start with `prefix`.
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.trim().to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_lowercases_and_appends_wildcard() {
        assert_eq!(prefix_pattern("Мук"), "мук%");
        assert_eq!(prefix_pattern("  egg "), "egg%");
    }

    #[test]
    fn prefix_pattern_escapes_like_metacharacters() {
        assert_eq!(prefix_pattern("100%_"), "100\\%\\_%");
    }
}
