//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use lms_server::{
    config::{AppConfig, BootstrapAdmin},
    models::book::CreateBook,
    repository::{DynStore, MemoryStore},
    services::isbn::DisabledLookup,
    AppState,
};

pub const ADMIN_LOGIN: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "integration-test-secret-0123456789".to_string();
    config.auth.argon2_memory_kib = 8;
    config.auth.argon2_iterations = 1;
    config.catalog.isbn_service_url = String::new();
    config
}

/// State over a fresh in-memory store with one bootstrap administrator
pub async fn test_state() -> AppState {
    let store: DynStore = Arc::new(MemoryStore::default());
    let state = AppState::new(test_config(), store, Arc::new(DisabledLookup)).unwrap();
    state
        .services
        .users
        .ensure_admin(&BootstrapAdmin {
            login: ADMIN_LOGIN.to_string(),
            password: ADMIN_PASSWORD.to_string(),
            email: None,
        })
        .await
        .unwrap();
    state
}

pub fn book(isbn: &str, copies: i32) -> CreateBook {
    CreateBook {
        isbn: isbn.to_string(),
        title: Some(format!("Book {}", isbn)),
        author: Some("Anonymous".to_string()),
        language: Some("eng".to_string()),
        location: None,
        total_copies: copies,
    }
}
