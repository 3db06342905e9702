//! Library lending server
//!
//! REST JSON API over a book catalog with per-title copy counts, loans with
//! due dates and renewals, and a per-book reservation queue.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Wire the services over a store. Fails on invalid auth configuration.
    pub fn new(
        config: AppConfig,
        store: repository::DynStore,
        isbn: Arc<dyn services::isbn::IsbnLookup>,
    ) -> AppResult<Self> {
        let services = services::Services::new(store, &config, isbn)?;
        Ok(Self {
            config: Arc::new(config),
            services: Arc::new(services),
        })
    }
}
