//! Repository layer: the backing store and its transactional unit of work.
//!
//! Every multi-step invariant (copy count + loan row, copy count + reservation
//! promotion, handle uniqueness + insert) runs inside one [`StoreTx`]. A
//! transaction that is dropped without [`StoreTx::commit`] leaves no trace.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        book::{Book, NewBook},
        loan::{Loan, LoanDetails, NewLoan},
        reservation::{NewReservation, Reservation, ReservationStatus},
        user::{NewUser, Role, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle to the store, passed explicitly to every service
pub type DynStore = Arc<dyn Store>;

/// Read-only queries plus the entry point for atomic units of work
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Fails with a transient error when the store cannot
    /// grant one within its configured timeout.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Check that the store is reachable
    async fn ping(&self) -> AppResult<()>;

    async fn get_user(&self, id: i32) -> AppResult<Option<User>>;

    /// Look a login handle up within one role partition (case-insensitive)
    async fn find_user_by_login(&self, login: &str, role: Role) -> AppResult<Option<User>>;

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    /// Books ordered by id
    async fn list_books(&self, offset: i64, limit: i64) -> AppResult<Vec<Book>>;

    async fn count_books(&self) -> AppResult<i64>;

    async fn get_active_loan(&self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>>;

    /// Active loans of a user, oldest first
    async fn list_user_loans(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>>;

    /// Pending reservations of a user, oldest first
    async fn list_user_reservations(&self, user_id: i32) -> AppResult<Vec<Reservation>>;
}

/// One atomic unit of work against the store.
///
/// `lock_*` methods take an exclusive lock on the row for the rest of the
/// transaction; callers lock the book row first whenever they touch its copy
/// counts or its reservation queue.
#[async_trait]
pub trait StoreTx: Send {
    /// Fails with `DuplicateHandle` when the login is taken in any role
    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User>;

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>>;

    async fn update_password(&mut self, user_id: i32, password_hash: &str) -> AppResult<()>;

    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Fails with `DuplicateIsbn` when the ISBN is already catalogued
    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book>;

    /// Persist every mutable column of `book`
    async fn update_book(&mut self, book: &Book) -> AppResult<()>;

    /// Remove a book together with its loan history and reservations
    async fn delete_book(&mut self, id: i32) -> AppResult<()>;

    async fn count_active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64>;

    async fn count_active_loans_for_user(&mut self, user_id: i32) -> AppResult<i64>;

    async fn find_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>>;

    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>>;

    /// Fails with `AlreadyBorrowed` when the pair already has an active loan
    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    /// Persist `due_at`, `returned_at` and `renewals` of `loan`
    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()>;

    async fn find_pending_reservation(
        &mut self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<Reservation>>;

    /// Up to `limit` pending reservations of a book, by `requested_at` then id,
    /// leaving out those of `exclude_user`
    async fn pending_reservations(
        &mut self,
        book_id: i32,
        exclude_user: Option<i32>,
        limit: i64,
    ) -> AppResult<Vec<Reservation>>;

    async fn has_pending_reservation_by_other(&mut self, book_id: i32, user_id: i32) -> AppResult<bool>;

    /// Fails with `AlreadyReserved` when the pair already has a pending reservation
    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation>;

    async fn set_reservation_status(
        &mut self,
        id: i32,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
