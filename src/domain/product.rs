use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::ValidateUrl;

use super::review::Review;
use super::require_non_empty;
use crate::error::{CatalogError, ValidationError};
use crate::store::{Document, StoredDocument};

/// Rating of a product that has no reviews yet.
pub const DEFAULT_RATING: f64 = 5.0;

/// Category assigned when the input leaves it blank.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Store-assigned product identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A marketplace listing mirrored into the catalog.
///
/// Field names follow the stored document layout (`darazLink`, `reviewCount`,
/// `createdAt`). The id lives outside the document body and is attached on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(skip)]
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub daraz_link: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_rating")]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
}

fn default_rating() -> f64 {
    DEFAULT_RATING
}

/// Mean of all review ratings rounded to one decimal, or [`DEFAULT_RATING`].
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return DEFAULT_RATING;
    }
    let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
    let mean = f64::from(total) / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

impl Product {
    /// Decodes a stored document, attaching the store-assigned id.
    pub fn from_document(doc: &StoredDocument) -> Result<Self, CatalogError> {
        let mut product: Product =
            serde_json::from_value(serde_json::Value::Object(doc.data.clone())).map_err(|e| {
                CatalogError::CorruptDocument {
                    id: doc.id.clone(),
                    reason: e.to_string(),
                }
            })?;
        product.id = ProductId::new(doc.id.clone());
        Ok(product)
    }

    /// Encodes the document body. The id is not part of it.
    pub fn to_document(&self) -> Result<Document, CatalogError> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(CatalogError::CorruptDocument {
                id: self.id.to_string(),
                reason: format!("encoded to non-object {}", other),
            }),
            Err(e) => Err(CatalogError::CorruptDocument {
                id: self.id.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Appends a review and recomputes the derived fields together.
    pub fn push_review(&mut self, review: Review) {
        self.reviews.push(review);
        self.refresh_rating();
    }

    fn refresh_rating(&mut self) {
        self.rating = average_rating(&self.reviews);
        self.review_count = self.reviews.len() as u32;
    }

    /// The three review-derived fields, encoded for a partial update.
    pub fn review_fields(&self) -> Result<Document, CatalogError> {
        let encode_err = |e: serde_json::Error| CatalogError::CorruptDocument {
            id: self.id.to_string(),
            reason: e.to_string(),
        };
        let mut fields = Document::new();
        fields.insert(
            "reviews".into(),
            serde_json::to_value(&self.reviews).map_err(encode_err)?,
        );
        fields.insert("rating".into(), serde_json::json!(self.rating));
        fields.insert("reviewCount".into(), serde_json::json!(self.review_count));
        Ok(fields)
    }
}

/// Price as submitted by a form: either a number or text that parses as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Amount(f64),
    Text(String),
}

impl Default for PriceInput {
    fn default() -> Self {
        PriceInput::Amount(0.0)
    }
}

impl PriceInput {
    pub fn resolve(&self) -> Result<f64, ValidationError> {
        let value = match self {
            PriceInput::Amount(amount) => *amount,
            PriceInput::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| ValidationError::InvalidPrice(text.clone()))?,
        };
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(ValidationError::InvalidPrice(value.to_string()))
        }
    }
}

impl From<f64> for PriceInput {
    fn from(value: f64) -> Self {
        PriceInput::Amount(value)
    }
}

impl From<u32> for PriceInput {
    fn from(value: u32) -> Self {
        PriceInput::Amount(f64::from(value))
    }
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        PriceInput::Text(value.to_string())
    }
}

impl From<String> for PriceInput {
    fn from(value: String) -> Self {
        PriceInput::Text(value)
    }
}

/// Payload for creating a new product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub price: PriceInput,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub daraz_link: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Seed reviews, e.g. when importing an existing listing.
    #[serde(default)]
    pub reviews: Option<Vec<Review>>,
}

impl ProductInput {
    pub fn new(
        name: impl Into<String>,
        price: impl Into<PriceInput>,
        daraz_link: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            daraz_link: daraz_link.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the input and fills every default, producing the record to persist.
    ///
    /// The returned product carries an empty id until the store assigns one.
    pub fn into_product(
        self,
        placeholder_image: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Product, ValidationError> {
        let name = require_non_empty(self.name, "name")?;
        let daraz_link = validate_link(self.daraz_link)?;
        let price = self.price.resolve()?;
        let images = validate_images(self.images, placeholder_image)?;
        let reviews = validate_reviews(self.reviews.unwrap_or_default())?;

        let mut product = Product {
            id: ProductId::default(),
            name,
            price,
            description: self.description.trim().to_string(),
            category: normalize_category(self.category),
            daraz_link,
            images,
            rating: DEFAULT_RATING,
            review_count: 0,
            reviews,
            created_at,
        };
        product.refresh_rating();
        Ok(product)
    }
}

/// Replacement values for the editable fields of a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<PriceInput>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub daraz_link: Option<String>,
    pub images: Option<Vec<String>>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.daraz_link.is_none()
            && self.images.is_none()
    }

    /// Validates the patch and encodes it as partial document fields.
    ///
    /// # Fields Updated
    /// - `name`, `darazLink`: validated as on create
    /// - `price`: coerced to a non-negative number
    /// - `images`: an empty list becomes the placeholder image
    /// - `description`, `category`: trimmed, blank category falls back to "Other"
    pub fn into_fields(self, placeholder_image: &str) -> Result<Document, ValidationError> {
        let mut fields = Document::new();
        if let Some(name) = self.name {
            fields.insert("name".into(), require_non_empty(name, "name")?.into());
        }
        if let Some(price) = self.price {
            fields.insert("price".into(), serde_json::json!(price.resolve()?));
        }
        if let Some(description) = self.description {
            fields.insert("description".into(), description.trim().into());
        }
        if let Some(category) = self.category {
            fields.insert("category".into(), normalize_category(category).into());
        }
        if let Some(link) = self.daraz_link {
            fields.insert("darazLink".into(), validate_link(link)?.into());
        }
        if let Some(images) = self.images {
            fields.insert(
                "images".into(),
                validate_images(images, placeholder_image)?.into(),
            );
        }
        Ok(fields)
    }
}

fn validate_link(link: String) -> Result<String, ValidationError> {
    let link = require_non_empty(link, "darazLink")?;
    if link.as_str().validate_url() {
        Ok(link)
    } else {
        Err(ValidationError::InvalidUrl("darazLink"))
    }
}

fn validate_images(
    images: Vec<String>,
    placeholder_image: &str,
) -> Result<Vec<String>, ValidationError> {
    if images.is_empty() {
        return Ok(vec![placeholder_image.to_string()]);
    }
    images
        .into_iter()
        .enumerate()
        .map(|(position, image)| {
            let trimmed = image.trim();
            if trimmed.is_empty() {
                Err(ValidationError::EmptyImage(position))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn validate_reviews(reviews: Vec<Review>) -> Result<Vec<Review>, ValidationError> {
    reviews
        .into_iter()
        .enumerate()
        .map(|(position, review)| {
            review
                .validated()
                .map_err(|reason| ValidationError::InvalidReview {
                    position,
                    reason: Box::new(reason),
                })
        })
        .collect()
}

fn normalize_category(category: String) -> String {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        FALLBACK_CATEGORY.to_string()
    } else {
        trimmed.to_string()
    }
}
