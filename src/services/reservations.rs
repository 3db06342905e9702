//! Reservation (hold queue) service

use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::reservation::{NewReservation, Reservation, ReservationStatus},
    repository::{DynStore, StoreTx},
};

#[derive(Clone)]
pub struct ReservationsService {
    store: DynStore,
}

impl ReservationsService {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Queue a reservation for a book, whether or not copies are on the shelf
    pub async fn reserve(&self, user_id: i32, book_id: i32) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;
        tx.lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::book_not_found(book_id))?;

        let reservation = tx
            .insert_reservation(&NewReservation {
                book_id,
                user_id,
                requested_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            "User {} reserved book {} (reservation {})",
            user_id,
            book_id,
            reservation.id
        );
        Ok(reservation)
    }

    /// Cancel the caller's pending reservation for a book
    pub async fn cancel(&self, user_id: i32, book_id: i32) -> AppResult<Reservation> {
        let mut tx = self.store.begin().await?;
        tx.lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::book_not_found(book_id))?;

        let mut reservation = tx
            .find_pending_reservation(user_id, book_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(
                    ErrorCode::NoPendingReservation,
                    format!("No pending reservation for book {}", book_id),
                )
            })?;

        let now = Utc::now();
        tx.set_reservation_status(reservation.id, ReservationStatus::Cancelled, now)
            .await?;
        tx.commit().await?;

        reservation.status = ReservationStatus::Cancelled;
        reservation.resolved_at = Some(now);

        tracing::info!("User {} cancelled reservation {}", user_id, reservation.id);
        Ok(reservation)
    }

    /// The caller's pending reservations, oldest first
    pub async fn user_reservations(&self, user_id: i32) -> AppResult<Vec<Reservation>> {
        self.store.list_user_reservations(user_id).await
    }
}

/// Fulfil up to `copies` of the oldest pending reservations for a book.
///
/// Runs inside the caller's transaction, after the book row is locked and its
/// available count raised. Reservations held by `skip_user` (the reader who
/// just handed the copy back) stay pending.
pub(crate) async fn promote_pending(
    tx: &mut dyn StoreTx,
    book_id: i32,
    skip_user: Option<i32>,
    copies: i64,
    now: DateTime<Utc>,
) -> AppResult<Vec<Reservation>> {
    if copies <= 0 {
        return Ok(Vec::new());
    }

    let mut promoted = tx.pending_reservations(book_id, skip_user, copies).await?;
    for reservation in promoted.iter_mut() {
        tx.set_reservation_status(reservation.id, ReservationStatus::Fulfilled, now)
            .await?;
        reservation.status = ReservationStatus::Fulfilled;
        reservation.resolved_at = Some(now);
        tracing::info!(
            "Reservation {} of user {} fulfilled for book {}",
            reservation.id,
            reservation.user_id,
            book_id
        );
    }
    Ok(promoted)
}
