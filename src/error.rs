use thiserror::Error;

use crate::store::StoreError;

/// Input rejected before any store call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{0} must be a valid URL")]
    InvalidUrl(&'static str),
    #[error("price must be a non-negative number, got {0:?}")]
    InvalidPrice(String),
    #[error("review rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),
    #[error("image reference at position {0} is empty")]
    EmptyImage(usize),
    #[error("seed review at position {position}: {reason}")]
    InvalidReview {
        position: usize,
        reason: Box<ValidationError>,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Product not found: {0}")]
    NotFound(String),
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Concurrent modification of product {id}: gave up after {attempts} attempts")]
    ConcurrencyConflict { id: String, attempts: u32 },
    #[error("Bulk delete partially committed: {committed} of {total} products removed ({reason})")]
    PartialCommit {
        committed: usize,
        total: usize,
        reason: String,
    },
    #[error("Corrupt product document {id}: {reason}")]
    CorruptDocument { id: String, reason: String },
    #[error("Admin secret rejected")]
    Unauthorized,
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CatalogError::NotFound(id),
            StoreError::VersionConflict { id, .. } => {
                CatalogError::ConcurrencyConflict { id, attempts: 1 }
            }
            other => CatalogError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let err: CatalogError = StoreError::NotFound("p1".into()).into();
        assert_eq!(err, CatalogError::NotFound("p1".into()));

        let err: CatalogError = StoreError::Unavailable("socket closed".into()).into();
        assert!(matches!(err, CatalogError::StoreUnavailable(msg) if msg.contains("socket closed")));

        let err: CatalogError = StoreError::PermissionDenied("rules".into()).into();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
    }
}
