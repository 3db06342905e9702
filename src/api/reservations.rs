//! Reservation endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{error::AppResult, models::reservation::Reservation, AppState};

use super::{loans::BookRef, AppJson, AuthenticatedUser};

/// Caller's pending reservations
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending reservations, oldest first", body = Vec<Reservation>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn my_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Reservation>>> {
    let reservations = state
        .services
        .reservations
        .user_reservations(claims.user_id)
        .await?;
    Ok(Json(reservations))
}

/// Reserve a book
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = BookRef,
    responses(
        (status = 201, description = "Reservation queued", body = Reservation),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already reserved", body = crate::error::ErrorResponse)
    )
)]
pub async fn reserve_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<BookRef>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let reservation = state
        .services
        .reservations
        .reserve(claims.user_id, request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a pending reservation
#[utoipa::path(
    post,
    path = "/reservations/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = BookRef,
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "No pending reservation", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<BookRef>,
) -> AppResult<Json<Reservation>> {
    let reservation = state
        .services
        .reservations
        .cancel(claims.user_id, request.book_id)
        .await?;
    Ok(Json(reservation))
}
