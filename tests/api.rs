//! Router-level tests: authorization gate, error shape and the lending flow over HTTP

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use lms_server::{api::create_router, models::user::Role};

use common::{test_state, ADMIN_LOGIN, ADMIN_PASSWORD};

struct TestApp {
    router: Router,
    state: lms_server::AppState,
}

impl TestApp {
    async fn new() -> Self {
        let state = test_state().await;
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(&self, path: &str, login: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                path,
                None,
                Some(json!({ "login": login, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin_token(&self) -> String {
        self.login("/api/v1/auth/admin/login", ADMIN_LOGIN, ADMIN_PASSWORD)
            .await
    }

    async fn user_token(&self, login: &str) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "login": login, "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        self.login("/api/v1/auth/login", login, "secret1").await
    }

    async fn add_book(&self, token: &str, isbn: &str, copies: i32) -> i64 {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/books",
                Some(token),
                Some(json!({ "isbn": isbn, "title": "Dune", "author": "Frank Herbert", "language": "eng", "total_copies": copies })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "add book failed: {}", body);
        body["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.call(Method::GET, "/api/v1/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn missing_and_bad_tokens_are_rejected_uniformly() {
    let app = TestApp::new().await;

    let (missing, missing_body) = app.call(Method::GET, "/api/v1/loans", None, None).await;
    let (forged, forged_body) = app
        .call(Method::GET, "/api/v1/loans", Some("not.a.token"), None)
        .await;

    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert_eq!(forged, StatusCode::UNAUTHORIZED);
    assert_eq!(missing_body, forged_body);
    assert_eq!(missing_body["code"], 2);
    assert_eq!(missing_body["error"], "NotAuthorized");
}

#[tokio::test]
async fn book_mutation_requires_admin() {
    let app = TestApp::new().await;
    let user = app.user_token("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/books",
            Some(&user),
            Some(json!({ "isbn": "123", "total_copies": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let admin = app.admin_token().await;
    let id = app.add_book(&admin, "123", 1).await;

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/v1/books/{}", id), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/v1/books/{}", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["status"], "Success");
}

#[tokio::test]
async fn user_and_admin_logins_are_separate() {
    let app = TestApp::new().await;
    app.user_token("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/admin/login",
            None,
            Some(json!({ "login": "alice", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UserNotFound");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "login": "alice", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "BadCredentials");
}

#[tokio::test]
async fn identity_comes_from_the_token() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;

    let (status, body) = app.call(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["login"], "alice");
    assert_eq!(body["role"], "user");

    let claims = app.state.services.tokens.verify(&token).unwrap();
    assert_eq!(claims.role, Role::User);
    assert_eq!(body["id"].as_i64().unwrap(), claims.user_id as i64);
}

#[tokio::test]
async fn lending_flow_over_http() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let a = app.user_token("reader_a").await;
    let b = app.user_token("reader_b").await;
    let book_id = app.add_book(&admin, "123", 1).await;

    let (status, loan) = app
        .call(Method::POST, "/api/v1/loans", Some(&a), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::POST, "/api/v1/loans", Some(&b), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NoAvailableCopies");

    let (status, _) = app
        .call(Method::POST, "/api/v1/reservations", Some(&b), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // B's reservation blocks A's renewal
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/v1/loans/{}/renew", loan["id"]),
            Some(&a),
            Some(json!({ "book_id": book_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "RenewFailed");

    let (status, body) = app
        .call(Method::POST, "/api/v1/loans/return", Some(&a), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fulfilled"].as_array().unwrap().len(), 1);

    let (_, book) = app
        .call(Method::GET, &format!("/api/v1/books/{}", book_id), None, None)
        .await;
    assert_eq!(book["available_copies"], 1);

    let (status, _) = app
        .call(Method::POST, "/api/v1/loans", Some(&b), Some(json!({ "book_id": book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, loans) = app.call(Method::GET, "/api/v1/loans", Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans.as_array().unwrap().len(), 1);

    let (status, status_body) = app
        .call(Method::GET, &format!("/api/v1/loans/books/{}", book_id), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["is_overdue"], false);
}

#[tokio::test]
async fn paging_errors_and_empty_pages() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.add_book(&admin, "123", 1).await;

    let (status, body) = app.call(Method::GET, "/api/v1/books?page=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = app
        .call(Method::GET, "/api/v1/books?page=5&per_page=10", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = app
        .call(Method::GET, "/api/v1/books?page=100000000000000000&per_page=100", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = app.call(Method::GET, "/api/v1/books/count", None, None).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn malformed_json_uses_error_format() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn malformed_query_and_path_use_error_format() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/v1/books?page=abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");

    let (status, body) = app.call(Method::GET, "/api/v1/books/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(body["code"], 18);
}

#[tokio::test]
async fn missing_barcode_is_reported() {
    let app = TestApp::new().await;
    let token = app.user_token("alice").await;

    let (status, body) = app
        .call(Method::GET, "/api/v1/users/me/barcode", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "BarcodeFailed");
}
