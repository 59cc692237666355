//! Search and category filtering over a catalog snapshot. Pure functions.

use crate::domain::Product;

/// Category value that disables the category predicate.
pub const ALL_CATEGORIES: &str = "All";

/// Products whose name or description contains `search_text` (case-insensitive)
/// and whose category equals `category`, unless it is [`ALL_CATEGORIES`].
/// Input order is preserved.
pub fn filter<'a>(products: &'a [Product], search_text: &str, category: &str) -> Vec<&'a Product> {
    let needle = search_text.to_lowercase();
    products
        .iter()
        .filter(|p| category == ALL_CATEGORIES || p.category == category)
        .filter(|p| {
            needle.is_empty()
                || p.name.to_lowercase().contains(&needle)
                || p.description.to_lowercase().contains(&needle)
        })
        .collect()
}

/// [`ALL_CATEGORIES`] followed by each distinct category in first-seen order.
pub fn categories(products: &[Product]) -> Vec<String> {
    let mut seen = vec![ALL_CATEGORIES.to_string()];
    for product in products {
        if !seen.contains(&product.category) {
            seen.push(product.category.clone());
        }
    }
    seen
}
