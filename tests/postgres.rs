//! Lending scenarios against a real PostgreSQL store
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres -- --ignored
//!
//! The database is shared between tests, so every test works on its own
//! logins and ISBNs.

mod common;

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;

use lms_server::{
    error::ErrorCode,
    models::{loan::NewLoan, reservation::ReservationStatus, user::RegisterUser},
    repository::{DynStore, PgStore, Store, StoreTx},
    services::isbn::DisabledLookup,
    AppState,
};

use common::{book, test_config};

async fn pg_store(lock_timeout: Duration) -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PgStore::new(pool, lock_timeout)
}

async fn pg_state() -> AppState {
    let store: DynStore = Arc::new(pg_store(Duration::from_secs(5)).await);
    AppState::new(test_config(), store, Arc::new(DisabledLookup)).unwrap()
}

/// Digits that differ between test runs, usable both in logins and ISBNs
fn unique() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}", nanos % 10_000_000_000_000)
}

async fn register(state: &AppState, login: &str) -> i32 {
    state
        .services
        .users
        .register(RegisterUser {
            login: login.to_string(),
            password: "secret1".to_string(),
            email: None,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn concurrent_borrows_of_last_copy() {
    let state = pg_state().await;
    let run = unique();
    let a = register(&state, &format!("pg_a_{}", run)).await;
    let b = register(&state, &format!("pg_b_{}", run)).await;
    let added = state.services.catalog.add_book(book(&run, 1)).await.unwrap();

    let first = {
        let loans = state.services.loans.clone();
        tokio::spawn(async move { loans.borrow(a, added.id).await })
    };
    let second = {
        let loans = state.services.loans.clone();
        tokio::spawn(async move { loans.borrow(b, added.id).await })
    };

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(err.code(), ErrorCode::NoAvailableCopies);

    let current = state.services.catalog.get_book(added.id).await.unwrap();
    assert_eq!(current.available_copies, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn concurrent_registrations_of_same_login() {
    let state = pg_state().await;
    let login = format!("pg_alice_{}", unique());

    let spawn_register = |login: String| {
        let users = state.services.users.clone();
        tokio::spawn(async move {
            users
                .register(RegisterUser {
                    login,
                    password: "secret1".to_string(),
                    email: None,
                })
                .await
        })
    };
    let first = spawn_register(login.clone());
    // Differs only in case; logins are unique case-insensitively
    let second = spawn_register(login.to_uppercase());

    let results = vec![first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(err.code(), ErrorCode::DuplicateHandle);
}

#[tokio::test]
#[ignore]
async fn borrow_reserve_return_borrow_scenario() {
    let state = pg_state().await;
    let services = &state.services;
    let run = unique();
    let a = register(&state, &format!("pg_a_{}", run)).await;
    let b = register(&state, &format!("pg_b_{}", run)).await;
    let added = services.catalog.add_book(book(&run, 1)).await.unwrap();

    services.loans.borrow(a, added.id).await.unwrap();
    let own = services.reservations.reserve(a, added.id).await.unwrap();
    let waiting = services.reservations.reserve(b, added.id).await.unwrap();

    let err = services.reservations.reserve(b, added.id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyReserved);

    let outcome = services.loans.return_book(a, added.id).await.unwrap();
    assert_eq!(outcome.fulfilled.len(), 1);
    assert_eq!(outcome.fulfilled[0].id, waiting.id);
    assert_eq!(outcome.fulfilled[0].status, ReservationStatus::Fulfilled);

    let queued = services.reservations.user_reservations(a).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, own.id);

    services.loans.borrow(b, added.id).await.unwrap();
    let current = services.catalog.get_book(added.id).await.unwrap();
    assert_eq!(current.available_copies, 0);
}

#[tokio::test]
#[ignore]
async fn second_active_loan_is_rejected_by_the_index() {
    let state = pg_state().await;
    let run = unique();
    let a = register(&state, &format!("pg_a_{}", run)).await;
    let added = state.services.catalog.add_book(book(&run, 2)).await.unwrap();
    let now = Utc::now();
    let loan = NewLoan {
        book_id: added.id,
        user_id: a,
        borrowed_at: now,
        due_at: now + chrono::Duration::days(14),
    };

    let mut tx = state.services.store.begin().await.unwrap();
    tx.insert_loan(&loan).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = state.services.store.begin().await.unwrap();
    let err = tx.insert_loan(&loan).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyBorrowed);
}

#[tokio::test]
#[ignore]
async fn held_book_lock_times_out_as_transient() {
    let store = pg_store(Duration::from_millis(200)).await;
    let state = pg_state().await;
    let added = state
        .services
        .catalog
        .add_book(book(&unique(), 1))
        .await
        .unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.lock_book(added.id).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.lock_book(added.id).await.unwrap_err();
    assert!(err.is_transient());
}
