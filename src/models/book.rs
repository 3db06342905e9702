//! Book (catalog title) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Placeholder used when the ISBN service cannot describe a book
pub const UNKNOWN: &str = "Unknown";

/// Catalog title with its copy counts.
///
/// Invariant: `0 <= available_copies <= total_copies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    /// Shelf location
    pub location: String,
    pub language: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Copies currently out on loan
    pub fn loaned_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }
}

/// Book record to insert; `available_copies` starts equal to `total_copies`.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub location: String,
    pub language: String,
    pub total_copies: i32,
}

/// Create book request. Missing bibliographic fields are filled from the ISBN service.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 32, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, max = 512))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub author: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub language: Option<String>,
    #[validate(length(max = 128))]
    pub location: Option<String>,
    #[validate(range(min = 0, max = 100000, message = "Copy count must be between 0 and 100000"))]
    pub total_copies: i32,
}

/// Partial book update
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 512))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub author: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub isbn: Option<String>,
    #[validate(length(max = 128))]
    pub location: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub language: Option<String>,
    #[validate(range(min = 0, max = 100000, message = "Copy count must be between 0 and 100000"))]
    pub total_copies: Option<i32>,
}

/// Keep only ISBN digits and the `X` check character.
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_isbn() {
        assert_eq!(normalize_isbn("978-2-07-040850-4"), "9782070408504");
        assert_eq!(normalize_isbn("2 07 040850 x"), "207040850X");
        assert_eq!(normalize_isbn("--"), "");
    }

    #[test]
    fn negative_copy_count_is_rejected() {
        let request = CreateBook {
            isbn: "123".into(),
            total_copies: -1,
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
