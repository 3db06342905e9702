//! Endpoints scoped to the calling user

use axum::{extract::State, http::header, response::IntoResponse};

use crate::{error::AppResult, services::barcode::BarcodeSubject, AppState};

use super::AuthenticatedUser;

/// Barcode image of the caller's library card
#[utoipa::path(
    get,
    path = "/users/me/barcode",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "PNG image"),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "No barcode for this user", body = crate::error::ErrorResponse)
    )
)]
pub async fn my_barcode(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let bytes = state
        .services
        .barcodes
        .read(BarcodeSubject::User(claims.user_id))
        .await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}
