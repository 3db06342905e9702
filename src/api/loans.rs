//! Loan endpoints. The borrower is always the token's identity.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        loan::{Loan, LoanDetails, LoanStatus},
        PageQuery,
    },
    services::loans::ReturnOutcome,
    AppState,
};

use super::{AppJson, AppPath, AppQuery, AuthenticatedUser};

/// Request naming a book
#[derive(Debug, Deserialize, ToSchema)]
pub struct BookRef {
    pub book_id: i32,
}

/// Caller's active loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Active loans, oldest first", body = Vec<LoanDetails>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_loans(claims.user_id, &query).await?;
    Ok(Json(loans))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BookRef,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copies, already borrowed or loan limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<BookRef>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state
        .services
        .loans
        .borrow(claims.user_id, request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BookRef,
    responses(
        (status = 200, description = "Book returned", body = ReturnOutcome),
        (status = 404, description = "Book not found or no active loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<BookRef>,
) -> AppResult<Json<ReturnOutcome>> {
    let outcome = state
        .services
        .loans
        .return_book(claims.user_id, request.book_id)
        .await?;
    Ok(Json(outcome))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = BookRef,
    responses(
        (status = 200, description = "Loan renewed", body = Loan),
        (status = 409, description = "Renewal refused", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(loan_id): AppPath<i32>,
    AppJson(request): AppJson<BookRef>,
) -> AppResult<Json<Loan>> {
    let loan = state
        .services
        .loans
        .renew(claims.user_id, loan_id, request.book_id)
        .await?;
    Ok(Json(loan))
}

/// Due date of the caller's loan of a book
#[utoipa::path(
    get,
    path = "/loans/books/{book_id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Loan status", body = LoanStatus),
        (status = 404, description = "No active loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn loan_status(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(book_id): AppPath<i32>,
) -> AppResult<Json<LoanStatus>> {
    let status = state
        .services
        .loans
        .loan_status(claims.user_id, book_id)
        .await?;
    Ok(Json(status))
}
