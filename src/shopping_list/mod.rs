//! Ingredient totals across every recipe in a user's shopping cart.

use serde::Serialize;

pub mod handler;

pub const HEADER: &str = "Список покупок:";
pub const FILENAME: &str = "shopping_list.txt";

/// One aggregated line: an ingredient and its summed amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Renders the downloadable plain-text list, one line per ingredient.
pub fn render(lines: &[ShoppingListLine]) -> String {
    let body = lines
        .iter()
        .map(|l| format!("{} ({}) - {}\n", l.name, l.measurement_unit, l.total_amount))
        .collect::<String>();
    format!("{HEADER}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, unit: &str, total: i64) -> ShoppingListLine {
        ShoppingListLine {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total_amount: total,
        }
    }

    #[test]
    fn empty_cart_renders_only_the_header() {
        assert_eq!(render(&[]), "Список покупок:\n");
    }

    #[test]
    fn renders_one_line_per_ingredient() {
        let text = render(&[line("Мука", "г", 500), line("Яйца", "шт", 2)]);
        assert_eq!(text, "Список покупок:\nМука (г) - 500\nЯйца (шт) - 2\n");
    }
}
