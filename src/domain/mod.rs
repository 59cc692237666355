//! Catalog entities and the validation that guards their invariants.

pub mod product;
pub mod review;

pub use product::*;
pub use review::*;

use crate::error::ValidationError;

pub(crate) fn require_non_empty(
    value: String,
    field: &'static str,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(trimmed.to_string())
    }
}
