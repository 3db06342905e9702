//! PostgreSQL store
//!
//! Lending transactions serialize on the book row (`SELECT ... FOR UPDATE`).
//! Partial unique indexes back up the one-active-loan and one-pending-reservation
//! rules, and every transaction runs with a `lock_timeout` so a stuck lock
//! surfaces as a transient error instead of a hang.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row, Transaction};

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

const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

const BOOK_COLUMNS: &str = "id, title, author, isbn, location, language, total_copies, available_copies, created_at, updated_at";
const LOAN_COLUMNS: &str = "id, book_id, user_id, borrowed_at, due_at, returned_at, renewals";
const RESERVATION_COLUMNS: &str = "id, book_id, user_id, requested_at, status, resolved_at";
const USER_COLUMNS: &str = "id, login, password, email, role, created_at, updated_at";

fn db_code(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// Map driver errors: lock waits and cancellations become transient, a unique
/// violation becomes the given conflict.
fn map_err(e: sqlx::Error, on_unique: Option<(ErrorCode, String)>) -> AppError {
    match db_code(&e).as_deref() {
        Some(UNIQUE_VIOLATION) => match on_unique {
            Some((code, message)) => AppError::Conflict(code, message),
            None => AppError::Database(e),
        },
        Some(LOCK_NOT_AVAILABLE) | Some(QUERY_CANCELED) | Some(SERIALIZATION_FAILURE)
        | Some(DEADLOCK_DETECTED) => AppError::Transient(e.to_string()),
        _ => AppError::Database(e),
    }
}

fn db(e: sqlx::Error) -> AppError {
    map_err(e, None)
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        // SET does not take bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)
    }

    async fn find_user_by_login(&self, login: &str, role: Role) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(login) = LOWER($1) AND role = $2",
            USER_COLUMNS
        ))
        .bind(login)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)
    }

    async fn list_books(&self, offset: i64, limit: i64) -> AppResult<Vec<Book>> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books ORDER BY id LIMIT $1 OFFSET $2",
            BOOK_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db)
    }

    async fn count_books(&self) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    async fn get_active_loan(&self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL",
            LOAN_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)
    }

    async fn list_user_loans(
        &self,
        user_id: i32,
        offset: i64,
        limit: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.book_id, l.user_id, l.borrowed_at, l.due_at, l.returned_at, l.renewals,
                   b.title, b.author, b.isbn
            FROM loans l
            JOIN books b ON b.id = l.book_id
            WHERE l.user_id = $1 AND l.returned_at IS NULL
            ORDER BY l.borrowed_at, l.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let loan = Loan {
                id: row.get("id"),
                book_id: row.get("book_id"),
                user_id: row.get("user_id"),
                borrowed_at: row.get("borrowed_at"),
                due_at: row.get("due_at"),
                returned_at: row.get("returned_at"),
                renewals: row.get("renewals"),
            };
            result.push(LoanDetails::new(
                &loan,
                row.get("title"),
                row.get("author"),
                row.get("isbn"),
                now,
            ));
        }

        Ok(result)
    }

    async fn list_user_reservations(&self, user_id: i32) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE user_id = $1 AND status = 'pending' ORDER BY requested_at, id",
            RESERVATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_user(&mut self, user: &NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (login, password, email, role, created_at) VALUES ($1, $2, $3, $4, NOW()) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            map_err(
                e,
                Some((
                    ErrorCode::DuplicateHandle,
                    format!("Login '{}' is already taken", user.login),
                )),
            )
        })
    }

    async fn get_user(&mut self, id: i32) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn update_password(&mut self, user_id: i32, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET password = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(AppError::user_not_found(user_id));
        }
        Ok(())
    }

    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, isbn, location, language, total_copies, available_copies, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6, NOW())
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.location)
        .bind(&book.language)
        .bind(book.total_copies)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            map_err(
                e,
                Some((
                    ErrorCode::DuplicateIsbn,
                    format!("A book with ISBN {} already exists", book.isbn),
                )),
            )
        })
    }

    async fn update_book(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE books
            SET title = $1, author = $2, isbn = $3, location = $4, language = $5,
                total_copies = $6, available_copies = $7, updated_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.location)
        .bind(&book.language)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            map_err(
                e,
                Some((
                    ErrorCode::DuplicateIsbn,
                    format!("A book with ISBN {} already exists", book.isbn),
                )),
            )
        })?;
        Ok(())
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<()> {
        // loans and reservations cascade
        sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn count_active_loans_for_book(&mut self, book_id: i32) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE book_id = $1 AND returned_at IS NULL")
            .bind(book_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db)
    }

    async fn count_active_loans_for_user(&mut self, user_id: i32) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE user_id = $1 AND returned_at IS NULL")
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db)
    }

    async fn find_active_loan(&mut self, user_id: i32, book_id: i32) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn lock_loan(&mut self, loan_id: i32) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (book_id, user_id, borrowed_at, due_at, renewals)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            map_err(
                e,
                Some((
                    ErrorCode::AlreadyBorrowed,
                    format!("Book {} is already borrowed by this user", loan.book_id),
                )),
            )
        })
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        sqlx::query("UPDATE loans SET due_at = $1, returned_at = $2, renewals = $3 WHERE id = $4")
            .bind(loan.due_at)
            .bind(loan.returned_at)
            .bind(loan.renewals)
            .bind(loan.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn find_pending_reservation(
        &mut self,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE user_id = $1 AND book_id = $2 AND status = 'pending' FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn pending_reservations(
        &mut self,
        book_id: i32,
        exclude_user: Option<i32>,
        limit: i64,
    ) -> AppResult<Vec<Reservation>> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'pending'
              AND ($2::INT4 IS NULL OR user_id != $2)
            ORDER BY requested_at, id
            LIMIT $3
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .bind(exclude_user)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn has_pending_reservation_by_other(&mut self, book_id: i32, user_id: i32) -> AppResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE book_id = $1 AND user_id != $2 AND status = 'pending')",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO reservations (book_id, user_id, requested_at, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.book_id)
        .bind(reservation.user_id)
        .bind(reservation.requested_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            map_err(
                e,
                Some((
                    ErrorCode::AlreadyReserved,
                    format!("Book {} is already reserved by this user", reservation.book_id),
                )),
            )
        })
    }

    async fn set_reservation_status(
        &mut self,
        id: i32,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE reservations SET status = $1, resolved_at = $2 WHERE id = $3")
            .bind(status)
            .bind(at)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(db)
    }
}
