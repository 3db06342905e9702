//! Data models for the LMS server

pub mod book;
pub mod loan;
pub mod reservation;
pub mod user;

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

// Re-export commonly used types
pub use book::{Book, CreateBook, UpdateBook};
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use reservation::{Reservation, ReservationStatus};
pub use user::{Role, User, UserClaims};

/// One-indexed page selection shared by every listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number, starting at 1
    pub page: Option<i64>,
    /// Items per page
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Resolve to `(page, per_page)` after applying defaults and bounds.
    pub fn resolve(&self, default_per_page: i64, max_per_page: i64) -> AppResult<(i64, i64)> {
        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(default_per_page);

        if page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if per_page < 1 || per_page > max_per_page {
            return Err(AppError::Validation(format!(
                "per_page must be between 1 and {}",
                max_per_page
            )));
        }
        Ok((page, per_page))
    }

    /// Resolve to an `(offset, limit)` window. Offsets past `i64::MAX` saturate,
    /// which still selects an empty page.
    pub fn window(&self, default_per_page: i64, max_per_page: i64) -> AppResult<(i64, i64)> {
        let (page, per_page) = self.resolve(default_per_page, max_per_page)?;
        Ok(((page - 1).saturating_mul(per_page), per_page))
    }
}
