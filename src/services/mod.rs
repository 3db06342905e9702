//! Business logic services

pub mod auth;
pub mod barcode;
pub mod catalog;
pub mod isbn;
pub mod loans;
pub mod reservations;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, repository::DynStore};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub tokens: auth::TokenService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub barcodes: barcode::BarcodeStore,
    pub store: DynStore,
}

impl Services {
    /// Create all services over the given store
    pub fn new(
        store: DynStore,
        config: &AppConfig,
        isbn: Arc<dyn isbn::IsbnLookup>,
    ) -> AppResult<Self> {
        Ok(Self {
            tokens: auth::TokenService::new(&config.auth)?,
            users: users::UsersService::new(store.clone(), &config.auth)?,
            catalog: catalog::CatalogService::new(store.clone(), isbn, config.catalog.clone()),
            loans: loans::LoansService::new(
                store.clone(),
                config.lending.clone(),
                config.catalog.clone(),
            )?,
            reservations: reservations::ReservationsService::new(store.clone()),
            barcodes: barcode::BarcodeStore::new(&config.barcode),
            store,
        })
    }
}
