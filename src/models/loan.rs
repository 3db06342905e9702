//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Loan model from database. Active while `returned_at` is unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renewals: i32,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Loan record to insert
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: i32,
    pub user_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Active loan joined with its book, for "my loans" listings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub book_id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub renewals: i32,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn new(
        loan: &Loan,
        title: String,
        author: String,
        isbn: String,
        now: DateTime<Utc>,
    ) -> Self {
        LoanDetails {
            id: loan.id,
            book_id: loan.book_id,
            title,
            author,
            isbn,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            renewals: loan.renewals,
            is_overdue: loan.due_at < now,
        }
    }
}

/// Due-date view of the caller's active loan on one book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanStatus {
    pub loan: Loan,
    /// Seconds until due; negative once overdue
    pub remaining_seconds: i64,
    pub is_overdue: bool,
}

impl LoanStatus {
    pub fn at(loan: Loan, now: DateTime<Utc>) -> Self {
        let remaining_seconds = (loan.due_at - now).num_seconds();
        LoanStatus {
            is_overdue: remaining_seconds < 0,
            remaining_seconds,
            loan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn loan(due_in: Duration, now: DateTime<Utc>) -> Loan {
        Loan {
            id: 1,
            book_id: 2,
            user_id: 3,
            borrowed_at: now - Duration::days(1),
            due_at: now + due_in,
            returned_at: None,
            renewals: 0,
        }
    }

    #[test]
    fn status_counts_down_to_due_date() {
        let now = Utc::now();
        let status = LoanStatus::at(loan(Duration::hours(2), now), now);
        assert_eq!(status.remaining_seconds, 7200);
        assert!(!status.is_overdue);
    }

    #[test]
    fn overdue_loan_has_negative_remaining_time() {
        let now = Utc::now();
        let status = LoanStatus::at(loan(Duration::seconds(-30), now), now);
        assert_eq!(status.remaining_seconds, -30);
        assert!(status.is_overdue);
    }
}
