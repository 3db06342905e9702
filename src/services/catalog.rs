//! Catalog management service

use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult, ErrorCode},
    models::{
        book::{normalize_isbn, Book, CreateBook, NewBook, UpdateBook, UNKNOWN},
        PageQuery,
    },
    repository::DynStore,
    services::{
        isbn::{BookMetadata, IsbnLookup},
        reservations::promote_pending,
    },
};

#[derive(Clone)]
pub struct CatalogService {
    store: DynStore,
    isbn: Arc<dyn IsbnLookup>,
    config: CatalogConfig,
}

impl CatalogService {
    pub fn new(store: DynStore, isbn: Arc<dyn IsbnLookup>, config: CatalogConfig) -> Self {
        Self {
            store,
            isbn,
            config,
        }
    }

    /// One page of the catalog, ordered by id
    pub async fn list_books(&self, query: &PageQuery) -> AppResult<Vec<Book>> {
        let (offset, limit) =
            query.window(self.config.default_page_size, self.config.max_page_size)?;
        self.store.list_books(offset, limit).await
    }

    /// Number of distinct titles
    pub async fn count(&self) -> AppResult<i64> {
        self.store.count_books().await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::book_not_found(id))
    }

    /// Add a title. Missing bibliographic fields are looked up by ISBN and
    /// fall back to "Unknown" when the lookup fails.
    pub async fn add_book(&self, request: CreateBook) -> AppResult<Book> {
        request.validate()?;

        let isbn = normalize_isbn(&request.isbn);
        if isbn.is_empty() {
            return Err(AppError::Validation("ISBN must contain digits".to_string()));
        }

        let needs_lookup =
            request.title.is_none() || request.author.is_none() || request.language.is_none();
        let metadata = if needs_lookup {
            match self.isbn.lookup(&isbn).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("ISBN lookup for {} failed, using placeholders: {}", isbn, e);
                    BookMetadata::default()
                }
            }
        } else {
            BookMetadata::default()
        };

        let new_book = NewBook {
            title: pick(request.title, metadata.title),
            author: pick(request.author, metadata.author),
            language: pick(request.language, metadata.language),
            location: request.location.unwrap_or_default(),
            isbn,
            total_copies: request.total_copies,
        };

        let mut tx = self.store.begin().await?;
        let book = tx.insert_book(&new_book).await?;
        tx.commit().await?;

        tracing::info!(
            "Added book {} '{}' (isbn {}, {} copies)",
            book.id,
            book.title,
            book.isbn,
            book.total_copies
        );
        Ok(book)
    }

    /// Update a title. Raising the copy count raises availability by the same
    /// amount and fulfils that many queued reservations.
    pub async fn update_book(&self, id: i32, request: UpdateBook) -> AppResult<Book> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let mut book = tx
            .lock_book(id)
            .await?
            .ok_or_else(|| AppError::book_not_found(id))?;

        if let Some(title) = request.title {
            book.title = title;
        }
        if let Some(author) = request.author {
            book.author = author;
        }
        if let Some(location) = request.location {
            book.location = location;
        }
        if let Some(language) = request.language {
            book.language = language;
        }
        if let Some(isbn) = request.isbn {
            let isbn = normalize_isbn(&isbn);
            if isbn.is_empty() {
                return Err(AppError::Validation("ISBN must contain digits".to_string()));
            }
            book.isbn = isbn;
        }

        let mut added = 0;
        if let Some(total) = request.total_copies {
            let loaned = book.loaned_copies();
            if total < loaned {
                return Err(AppError::Validation(format!(
                    "Cannot lower copies of book {} to {}: {} are on loan",
                    id, total, loaned
                )));
            }
            added = total - book.total_copies;
            book.total_copies = total;
            book.available_copies = total - loaned;
        }

        tx.update_book(&book).await?;
        if added > 0 {
            promote_pending(tx.as_mut(), id, None, added as i64, Utc::now()).await?;
        }
        tx.commit().await?;

        tracing::info!("Updated book {}", id);
        Ok(book)
    }

    /// Delete a title that has no copies out on loan
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        tx.lock_book(id)
            .await?
            .ok_or_else(|| AppError::book_not_found(id))?;

        let active = tx.count_active_loans_for_book(id).await?;
        if active > 0 {
            return Err(AppError::Conflict(
                ErrorCode::HasActiveLoans,
                format!("Book {} has {} active loan(s)", id, active),
            ));
        }

        tx.delete_book(id).await?;
        tx.commit().await?;

        tracing::info!("Deleted book {}", id);
        Ok(())
    }
}

fn pick(given: Option<String>, looked_up: Option<String>) -> String {
    given
        .or(looked_up)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
