//! ISBN metadata lookup
//!
//! Used when a book is added without its bibliographic fields. Lookups are
//! best effort: callers fall back to placeholders on any failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
};

/// Bibliographic fields returned by the metadata service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IsbnLookup: Send + Sync {
    async fn lookup(&self, isbn: &str) -> AppResult<BookMetadata>;
}

/// Build the lookup configured for this deployment
pub fn from_config(config: &CatalogConfig) -> AppResult<Arc<dyn IsbnLookup>> {
    if config.isbn_service_url.trim().is_empty() {
        tracing::info!("ISBN lookups disabled");
        return Ok(Arc::new(DisabledLookup));
    }
    Ok(Arc::new(OpenLibraryLookup::new(
        &config.isbn_service_url,
        Duration::from_secs(config.isbn_timeout_secs),
    )?))
}

/// Lookup that always fails, for deployments without a metadata service
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLookup;

#[async_trait]
impl IsbnLookup for DisabledLookup {
    async fn lookup(&self, isbn: &str) -> AppResult<BookMetadata> {
        Err(AppError::Internal(format!(
            "ISBN lookup disabled, cannot describe {}",
            isbn
        )))
    }
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct EditionRecord {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<KeyRef>,
    #[serde(default)]
    languages: Vec<KeyRef>,
}

#[derive(Debug, Deserialize)]
struct AuthorRecord {
    name: Option<String>,
}

/// OpenLibrary JSON API client
#[derive(Clone)]
pub struct OpenLibraryLookup {
    client: reqwest::Client,
    base_url: String,
}

impl OpenLibraryLookup {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("ISBN service request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "ISBN service answered {} for {}",
                response.status(),
                url
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid ISBN service response: {}", e)))
    }
}

#[async_trait]
impl IsbnLookup for OpenLibraryLookup {
    async fn lookup(&self, isbn: &str) -> AppResult<BookMetadata> {
        let edition: EditionRecord = self.get_json(&format!("/isbn/{}.json", isbn)).await?;

        // The author name is optional; a failed author fetch keeps the title.
        let author = match edition.authors.first() {
            Some(author) => match self
                .get_json::<AuthorRecord>(&format!("{}.json", author.key))
                .await
            {
                Ok(record) => record.name,
                Err(e) => {
                    tracing::debug!("Author lookup for {} failed: {}", isbn, e);
                    None
                }
            },
            None => None,
        };

        Ok(BookMetadata {
            title: edition.title,
            author,
            language: edition.languages.first().map(|l| language_code(&l.key)),
        })
    }
}

/// `/languages/eng` -> `eng`
fn language_code(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_code_from_key() {
        assert_eq!(language_code("/languages/fre"), "fre");
        assert_eq!(language_code("eng"), "eng");
    }

    #[test]
    fn edition_record_tolerates_missing_lists() {
        let record: EditionRecord = serde_json::from_str(r#"{"title": "Dune"}"#).unwrap();
        assert_eq!(record.title.as_deref(), Some("Dune"));
        assert!(record.authors.is_empty());
        assert!(record.languages.is_empty());
    }

    #[tokio::test]
    async fn disabled_lookup_always_fails() {
        assert!(DisabledLookup.lookup("9780441013593").await.is_err());
    }

    #[test]
    fn empty_url_disables_lookups() {
        let config = CatalogConfig {
            isbn_service_url: String::new(),
            ..CatalogConfig::default()
        };
        assert!(from_config(&config).is_ok());
    }
}
