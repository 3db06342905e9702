//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, reservations, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LMS API",
        version = "0.3.0",
        description = "Library lending REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::admin_login,
        auth::register,
        auth::me,
        auth::update_password,
        // Books
        books::list_books,
        books::count_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::book_barcode,
        // Users
        users::my_barcode,
        // Loans
        loans::my_loans,
        loans::borrow_book,
        loans::return_book,
        loans::renew_loan,
        loans::loan_status,
        // Reservations
        reservations::my_reservations,
        reservations::reserve_book,
        reservations::cancel_reservation,
    ),
    components(
        schemas(
            // Auth
            auth::LoginResponse,
            crate::models::user::LoginRequest,
            crate::models::user::RegisterUser,
            crate::models::user::UpdatePassword,
            crate::models::user::UserInfo,
            crate::models::user::Role,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            books::BookCount,
            // Loans
            loans::BookRef,
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanStatus,
            crate::services::loans::ReturnOutcome,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            // Health
            health::HealthResponse,
            // Responses
            crate::api::StatusResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "users", description = "Caller's account"),
        (name = "loans", description = "Borrowing, returns and renewals"),
        (name = "reservations", description = "Hold queue")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
