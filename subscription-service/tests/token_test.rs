//! Token manager integration tests.

mod common;

use chrono::{Duration, Utc};
use common::{TestApp, ALICE, ALICE_PASSWORD};
use subscription_service::models::RecordStatus;
use subscription_service::services::{ErrorKind, TokenStore};

#[tokio::test]
async fn authenticating_twice_retires_the_first_token() {
    let app = TestApp::spawn().await;

    let t1 = app.alice_token().await;
    let t2 = app.alice_token().await;
    assert_ne!(t1, t2);

    let err = app.gateway().validate(&t1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
    assert!(app.gateway().validate(&t2).await.unwrap());

    let active = app.store.find_active_tokens(app.alice_id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].token, t2);
}

#[tokio::test]
async fn username_lookup_is_case_insensitive() {
    let app = TestApp::spawn().await;
    let token = app.login("ALICE", ALICE_PASSWORD).await;
    assert_eq!(
        app.gateway().authorize(&token, app.alice_id).await.unwrap(),
        app.alice_id
    );
}

#[tokio::test]
async fn authenticate_rejects_bad_credentials() {
    let app = TestApp::spawn().await;

    let err = app.gateway().authenticate("carol", "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "User not found");

    let err = app.gateway().authenticate(ALICE, "secret1!").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCredential);

    // A failed attempt must not issue anything.
    assert!(app
        .store
        .find_active_tokens(app.alice_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn inactive_account_cannot_authenticate() {
    let app = TestApp::spawn().await;
    app.store
        .set_user_status(app.alice_id, RecordStatus::Inactive)
        .unwrap();

    let err = app
        .gateway()
        .authenticate(ALICE, ALICE_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccountInactive);
}

#[tokio::test]
async fn bearer_prefix_is_stripped() {
    let app = TestApp::spawn().await;
    let token = app.alice_token().await;

    assert!(app
        .gateway()
        .validate(&format!("Bearer {}", token))
        .await
        .unwrap());
    assert!(app
        .gateway()
        .validate(&format!("bEARER {}", token))
        .await
        .unwrap());
}

#[tokio::test]
async fn expired_token_fails_and_is_deactivated() {
    let app = TestApp::spawn().await;
    let token = app.alice_token().await;

    app.store
        .set_token_expiry(&token, Utc::now() - Duration::seconds(5))
        .unwrap();

    let err = app.gateway().validate(&token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    let stored = app.store.find_token(&token).await.unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::Inactive);

    // Stays expired even if the clock were moved back.
    app.store
        .set_token_expiry(&token, Utc::now() + Duration::minutes(5))
        .unwrap();
    let err = app.gateway().validate(&token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn token_of_removed_or_inactive_owner_is_rejected() {
    let app = TestApp::spawn().await;
    let alice = app.alice_token().await;
    let bob = app.bob_token().await;

    app.store
        .set_user_status(app.alice_id, RecordStatus::Inactive)
        .unwrap();
    let err = app.gateway().validate(&alice).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AccountInactive);

    app.store.remove_user(app.bob_id).unwrap();
    let err = app.gateway().validate(&bob).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn authorize_rejects_other_users() {
    let app = TestApp::spawn().await;
    let token = app.alice_token().await;

    let err = app
        .gateway()
        .authorize(&token, app.bob_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserMismatch);
}

#[tokio::test]
async fn logout_invalidates_token() {
    let app = TestApp::spawn().await;
    let token = app.alice_token().await;

    app.gateway().logout(&token).await.unwrap();

    let err = app.gateway().validate(&token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    let err = app.gateway().logout(&token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn refresh_issues_new_token_and_retires_old() {
    let app = TestApp::spawn().await;
    let old = app.alice_token().await;

    let new = app.gateway().refresh(&old).await.unwrap().token;
    assert_ne!(old, new);
    assert!(app.gateway().validate(&new).await.unwrap());
    assert_eq!(
        app.gateway().validate(&old).await.unwrap_err().kind(),
        ErrorKind::Expired
    );
}

#[tokio::test]
async fn issued_token_expires_after_configured_window() {
    let app = TestApp::spawn_with(|config| config.token.validity_minutes = 5).await;
    let before = Utc::now();
    let token = app.alice_token().await;

    let stored = app.store.find_token(&token).await.unwrap().unwrap();
    assert_eq!(stored.expiry_utc - stored.issued_utc, Duration::minutes(5));
    assert!(stored.issued_utc >= before);
    assert_eq!(stored.created_by, ALICE);
}
