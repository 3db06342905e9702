//! In-memory store.
//!
//! Transactions are serialized behind one async mutex: `begin` takes the lock
//! and works on a private copy of the state, `commit` publishes the copy.
//! Dropping an uncommitted transaction releases the lock and discards the copy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        book::{Book, NewBook},
        loan::{Loan, LoanDetails, NewLoan},
        reservation::{NewReservation, Reservation, ReservationStatus},
        user::{NewUser, Role, User},
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    loans: BTreeMap<i32, Loan>,
    reservations: BTreeMap<i32, Reservation>,
    last_user_id: i32,
    last_book_id: i32,
    last_loan_id: i32,
    last_reservation_id: i32,
}

impl MemoryState {
    fn login_taken(&self, login: &str) -> bool {
        self.users
            .values()
            .any(|u| u.login.eq_ignore_ascii_case(login))
    }

    fn active_loan(&self, user_id: i32, book_id: i32) -> Option<&Loan> {
        self.loans
            .values()
            .find(|l| l.user_id == user_id && l.book_id == book_id && l.is_active())
    }

    fn pending_reservation(&self, user_id: i32, book_id: i32) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.user_id == user_id && r.book_id == book_id && r.is_pending())
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    timeout: Duration,
}

impl MemoryStore {
    /// `timeout` bounds how long a caller waits for the store lock.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            timeout,
        }
    }

    async fn read(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        tokio::time::timeout(self.timeout, self.state.lock())
            .await
            .map_err(|_| AppError::Transient("timed out waiting for the store".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = tokio::time::timeout(self.timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| AppError::Transient("timed out waiting for a transaction".to_string()))?;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn ping(&self) -> AppResult<()> {
        self.read().await.map(|_| ())
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.read().await?.users.get(&id).cloned())
    }

    async fn find_user_by_login(&self, login: &str, role: Role) -> AppResult<Option<User>> {
        Ok(self
            .read()
            .await?
            .users
            .values()
            .find(|u| u.role == role && u.login.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.read().await?.books.get(&id).cloned())
    }

    async fn list_books(&self, offset: i64, limit: i64) -> AppResult<Vec<Book>> {
        Ok(self
            .read()
            .await?
            .books
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_books(&self) -> AppResult<i64> {
        Ok(self.read().await?.books.len() as i64)
    }

    async fn get_active_loan(&self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        Ok(self.read().await?.active_loan(user_id, book_id).cloned())
    }

    async fn list_user_loans(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let state = self.read().await?;
        let mut loans: Vec<&Loan> = state
            .loans
            .values()
            .filter(|l| l.user_id == user_id && l.is_active())
            .collect();
        loans.sort_by_key(|l| (l.borrowed_at, l.id));

        Ok(loans
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|loan| {
                state.books.get(&loan.book_id).map(|book| {
                    LoanDetails::new(
                        loan,
                        book.title.clone(),
                        book.author.clone(),
                        book.isbn.clone(),
                        now,
                    )
                })
            })
            .collect())
    }

    async fn list_user_reservations(&self, user_id: i32) -> AppResult<Vec<Reservation>> {
        let state = self.read().await?;
        let mut reservations: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && r.is_pending())
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.requested_at, r.id));
        Ok(reservations)
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        if self.work.login_taken(&user.login) {
            return Err(AppError::Conflict(
                ErrorCode::DuplicateHandle,
                format!("Login '{}' is already taken", user.login),
            ));
        }

        self.work.last_user_id += 1;
        let created = User {
            id: self.work.last_user_id,
            login: user.login.clone(),
            password: user.password_hash.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.work.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn update_password(&mut self, user_id: i32, password_hash: &str) -> AppResult<()> {
        let user = self
            .work
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::user_not_found(user_id))?;
        user.password = password_hash.to_string();
        user.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.work.books.get(&id).cloned())
    }

    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book> {
        if self.work.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::Conflict(
                ErrorCode::DuplicateIsbn,
                format!("A book with ISBN {} already exists", book.isbn),
            ));
        }

        self.work.last_book_id += 1;
        let created = Book {
            id: self.work.last_book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            location: book.location.clone(),
            language: book.language.clone(),
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.work.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        if book.available_copies < 0 || book.available_copies > book.total_copies {
            return Err(AppError::Internal(format!(
                "copy counts out of bounds for book {}: {}/{}",
                book.id, book.available_copies, book.total_copies
            )));
        }
        if self
            .work
            .books
            .values()
            .any(|b| b.id != book.id && b.isbn == book.isbn)
        {
            return Err(AppError::Conflict(
                ErrorCode::DuplicateIsbn,
                format!("A book with ISBN {} already exists", book.isbn),
            ));
        }

        let stored = self
            .work
            .books
            .get_mut(&book.id)
            .ok_or_else(|| AppError::book_not_found(book.id))?;
        *stored = Book {
            updated_at: Some(Utc::now()),
            ..book.clone()
        };
        Ok(())
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        self.work.books.remove(&id);
        self.work.loans.retain(|_, l| l.book_id != id);
        self.work.reservations.retain(|_, r| r.book_id != id);
        Ok(())
    }

    async fn count_active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|l| l.book_id == book_id && l.is_active())
            .count() as i64)
    }

    async fn count_active_loans_for_user(&mut self, user_id: i32) -> AppResult<i64> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|l| l.user_id == user_id && l.is_active())
            .count() as i64)
    }

    async fn find_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        Ok(self.work.active_loan(user_id, book_id).cloned())
    }

    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>> {
        Ok(self.work.loans.get(&loan_id).cloned())
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        if self.work.active_loan(loan.user_id, loan.book_id).is_some() {
            return Err(AppError::Conflict(
                ErrorCode::AlreadyBorrowed,
                format!("Book {} is already borrowed by this user", loan.book_id),
            ));
        }

        self.work.last_loan_id += 1;
        let created = Loan {
            id: self.work.last_loan_id,
            book_id: loan.book_id,
            user_id: loan.user_id,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            returned_at: None,
            renewals: 0,
        };
        self.work.loans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        let stored = self
            .work
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| AppError::Internal(format!("loan {} vanished", loan.id)))?;
        stored.due_at = loan.due_at;
        stored.returned_at = loan.returned_at;
        stored.renewals = loan.renewals;
        Ok(())
    }

    async fn find_pending_reservation(
        &mut self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        Ok(self.work.pending_reservation(user_id, book_id).cloned())
    }

    async fn pending_reservations(
        &mut self,
        book_id: i32,
        exclude_user: Option<i32>,
        limit: i64,
    ) -> AppResult<Vec<Reservation>> {
        let mut queue: Vec<Reservation> = self
            .work
            .reservations
            .values()
            .filter(|r| r.book_id == book_id && r.is_pending())
            .filter(|r| Some(r.user_id) != exclude_user)
            .cloned()
            .collect();
        queue.sort_by_key(|r| (r.requested_at, r.id));
        queue.truncate(limit.max(0) as usize);
        Ok(queue)
    }

    async fn has_pending_reservation_by_other(&mut self, book_id: i32, user_id: i32) -> AppResult<bool> {
        Ok(self
            .work
            .reservations
            .values()
            .any(|r| r.book_id == book_id && r.user_id != user_id && r.is_pending()))
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        if self
            .work
            .pending_reservation(reservation.user_id, reservation.book_id)
            .is_some()
        {
            return Err(AppError::Conflict(
                ErrorCode::AlreadyReserved,
                format!("Book {} is already reserved by this user", reservation.book_id),
            ));
        }

        self.work.last_reservation_id += 1;
        let created = Reservation {
            id: self.work.last_reservation_id,
            book_id: reservation.book_id,
            user_id: reservation.user_id,
            requested_at: reservation.requested_at,
            status: ReservationStatus::Pending,
            resolved_at: None,
        };
        self.work.reservations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_reservation_status(
        &mut self,
        id: i32,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let stored = self
            .work
            .reservations
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal(format!("reservation {} vanished", id)))?;
        stored.status = status;
        stored.resolved_at = Some(at);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
