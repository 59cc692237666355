use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::require_non_empty;
use crate::error::ValidationError;

/// A customer review embedded in its parent product. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub user: String,
    pub rating: u8,
    pub comment: String,
    pub date: DateTime<Utc>,
}

impl Review {
    /// Normalizes a review that arrived already built, e.g. seeded on create,
    /// under the same rules as [`ReviewInput::into_review`].
    pub fn validated(self) -> Result<Review, ValidationError> {
        Ok(Review {
            user: require_non_empty(self.user, "user")?,
            rating: check_rating(i64::from(self.rating))?,
            comment: require_non_empty(self.comment, "comment")?,
            date: self.date,
        })
    }
}

fn check_rating(rating: i64) -> Result<u8, ValidationError> {
    u8::try_from(rating)
        .ok()
        .filter(|r| (1..=5).contains(r))
        .ok_or(ValidationError::RatingOutOfRange(rating))
}

/// Payload for appending a review to a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInput {
    pub user: String,
    pub rating: i64,
    pub comment: String,
}

impl ReviewInput {
    pub fn new(user: impl Into<String>, rating: i64, comment: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            rating,
            comment: comment.into(),
        }
    }

    /// Validates the payload and stamps it with the append time.
    ///
    /// # Errors
    /// `Empty` for a blank `user` or `comment`, `RatingOutOfRange` outside 1..=5.
    pub fn into_review(self, date: DateTime<Utc>) -> Result<Review, ValidationError> {
        let user = require_non_empty(self.user, "user")?;
        let comment = require_non_empty(self.comment, "comment")?;
        let rating = check_rating(self.rating)?;

        Ok(Review {
            user,
            rating,
            comment,
            date,
        })
    }
}
