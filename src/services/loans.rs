//! Lending engine: borrow, return and renew
//!
//! Each operation is one store transaction that locks the book row before
//! touching its copy counts, so concurrent borrowers of the last copy are
//! serialized and exactly one of them wins.

use chrono::{Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::{CatalogConfig, LendingConfig},
    error::{AppError, AppResult, ErrorCode},
    models::{
        loan::{Loan, LoanDetails, LoanStatus, NewLoan},
        reservation::{Reservation, ReservationStatus},
        PageQuery,
    },
    repository::DynStore,
    services::reservations::promote_pending,
};

/// Result of a return: the closed loan and the reservations it fulfilled
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub loan: Loan,
    pub fulfilled: Vec<Reservation>,
}

/// Longest loan or renewal period accepted from configuration
const MAX_PERIOD_DAYS: i64 = 3650;
const MAX_RENEWALS: i32 = 100;

#[derive(Clone)]
pub struct LoansService {
    store: DynStore,
    config: LendingConfig,
    paging: CatalogConfig,
}

impl LoansService {
    /// Fails when a lending period or limit is outside its accepted range
    pub fn new(store: DynStore, config: LendingConfig, paging: CatalogConfig) -> AppResult<Self> {
        check_lending_config(&config)?;
        Ok(Self {
            store,
            config,
            paging,
        })
    }

    /// Borrow one copy of a book
    pub async fn borrow(&self, user_id: i32, book_id: i32) -> AppResult<Loan> {
        let mut tx = self.store.begin().await?;

        let mut book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::book_not_found(book_id))?;

        if book.available_copies <= 0 {
            tracing::debug!("User {} cannot borrow book {}: no copies left", user_id, book_id);
            return Err(AppError::Conflict(
                ErrorCode::NoAvailableCopies,
                format!("No copies of book {} are available", book_id),
            ));
        }

        if tx.find_active_loan(user_id, book_id).await?.is_some() {
            return Err(AppError::Conflict(
                ErrorCode::AlreadyBorrowed,
                format!("Book {} is already borrowed by this user", book_id),
            ));
        }

        let active = tx.count_active_loans_for_user(user_id).await?;
        if active >= self.config.max_active_loans {
            return Err(AppError::Conflict(
                ErrorCode::MaxLoansReached,
                format!("Loan limit of {} reached", self.config.max_active_loans),
            ));
        }

        let now = Utc::now();
        book.available_copies -= 1;
        tx.update_book(&book).await?;

        let loan = tx
            .insert_loan(&NewLoan {
                book_id,
                user_id,
                borrowed_at: now,
                due_at: now + Duration::days(self.config.loan_period_days),
            })
            .await?;

        if let Some(reservation) = tx.find_pending_reservation(user_id, book_id).await? {
            tx.set_reservation_status(reservation.id, ReservationStatus::Fulfilled, now)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "User {} borrowed book {} (loan {}, due {})",
            user_id,
            book_id,
            loan.id,
            loan.due_at
        );
        Ok(loan)
    }

    /// Return the caller's active loan of a book
    pub async fn return_book(&self, user_id: i32, book_id: i32) -> AppResult<ReturnOutcome> {
        let mut tx = self.store.begin().await?;

        let mut book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::book_not_found(book_id))?;

        let mut loan = tx.find_active_loan(user_id, book_id).await?.ok_or_else(|| {
            AppError::NotFound(
                ErrorCode::NoActiveLoan,
                format!("No active loan of book {}", book_id),
            )
        })?;

        let now = Utc::now();
        loan.returned_at = Some(now);
        tx.update_loan(&loan).await?;

        let fulfilled = if book.available_copies < book.total_copies {
            book.available_copies += 1;
            tx.update_book(&book).await?;
            promote_pending(tx.as_mut(), book_id, Some(user_id), 1, now).await?
        } else {
            // Total was lowered while this copy was out; nothing to put back.
            tracing::warn!(
                "Book {} already has all {} copies available; return not counted",
                book_id,
                book.total_copies
            );
            Vec::new()
        };

        tx.commit().await?;

        tracing::info!("User {} returned book {} (loan {})", user_id, book_id, loan.id);
        Ok(ReturnOutcome { loan, fulfilled })
    }

    /// Extend an active loan by one renewal period
    pub async fn renew(&self, user_id: i32, loan_id: i32, book_id: i32) -> AppResult<Loan> {
        let mut tx = self.store.begin().await?;

        if tx.lock_book(book_id).await?.is_none() {
            return Err(renew_failed("book does not exist"));
        }

        let mut loan = tx
            .lock_loan(loan_id)
            .await?
            .ok_or_else(|| renew_failed("loan does not exist"))?;

        if loan.user_id != user_id || loan.book_id != book_id {
            return Err(renew_failed("loan does not match"));
        }
        if !loan.is_active() {
            return Err(renew_failed("loan is already returned"));
        }
        if loan.renewals >= self.config.max_renewals {
            return Err(renew_failed("renewal limit reached"));
        }
        if tx.has_pending_reservation_by_other(book_id, user_id).await? {
            return Err(renew_failed("book is reserved by another user"));
        }

        loan.due_at += Duration::days(self.config.renewal_period_days);
        loan.renewals += 1;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} renewed ({} of {}), now due {}",
            loan.id,
            loan.renewals,
            self.config.max_renewals,
            loan.due_at
        );
        Ok(loan)
    }

    /// Due date and remaining time of the caller's active loan of a book
    pub async fn loan_status(&self, user_id: i32, book_id: i32) -> AppResult<LoanStatus> {
        let loan = self
            .store
            .get_active_loan(user_id, book_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    ErrorCode::NoActiveLoan,
                    format!("No active loan of book {}", book_id),
                )
            })?;
        Ok(LoanStatus::at(loan, Utc::now()))
    }

    /// Page of the caller's active loans
    pub async fn user_loans(&self, user_id: i32, query: &PageQuery) -> AppResult<Vec<LoanDetails>> {
        let (offset, limit) =
            query.window(self.paging.default_page_size, self.paging.max_page_size)?;
        self.store
            .list_user_loans(user_id, offset, limit, Utc::now())
            .await
    }
}

fn renew_failed(reason: &str) -> AppError {
    tracing::debug!("Renewal refused: {}", reason);
    AppError::Conflict(ErrorCode::RenewFailed, format!("Renewal failed: {}", reason))
}

fn check_lending_config(config: &LendingConfig) -> AppResult<()> {
    let periods = [
        ("lending.loan_period_days", config.loan_period_days),
        ("lending.renewal_period_days", config.renewal_period_days),
    ];
    for (name, days) in periods {
        if !(1..=MAX_PERIOD_DAYS).contains(&days) {
            return Err(AppError::Internal(format!(
                "{} must be between 1 and {}",
                name, MAX_PERIOD_DAYS
            )));
        }
    }
    if !(0..=MAX_RENEWALS).contains(&config.max_renewals) {
        return Err(AppError::Internal(format!(
            "lending.max_renewals must be between 0 and {}",
            MAX_RENEWALS
        )));
    }
    if config.max_active_loans < 1 {
        return Err(AppError::Internal(
            "lending.max_active_loans must be positive".to_string(),
        ));
    }
    Ok(())
}
