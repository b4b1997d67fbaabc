//! PostgreSQL store tests. Run with `cargo test -- --ignored` against a live
//! database (`TEST_DATABASE_URL`).

mod common;

use common::{create_request, PostgresTestApp};
use futures::future::join_all;
use subscription_service::models::RecordStatus;
use subscription_service::services::{ErrorKind, TokenStore};

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn health_check_works() {
    let app = PostgresTestApp::spawn().await;
    app.app.health_check().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn token_rotation_against_postgres() {
    let app = PostgresTestApp::spawn().await;
    let user = app
        .db
        .insert_user("Alice", "Secret1!", RecordStatus::Active)
        .await
        .unwrap();
    let gateway = app.app.gateway();

    let t1 = gateway.authenticate("alice", "Secret1!").await.unwrap().token;
    let t2 = gateway.authenticate("ALICE", "Secret1!").await.unwrap().token;
    assert_ne!(t1, t2);
    assert_eq!(
        gateway.validate(&t1).await.unwrap_err().kind(),
        ErrorKind::Expired
    );
    assert!(gateway.validate(&t2).await.unwrap());
    assert_eq!(app.db.find_active_tokens(user.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires running PostgreSQL
async fn parallel_creates_hit_unique_index() {
    let app = PostgresTestApp::spawn().await;
    let user = app
        .db
        .insert_user("bob", "pw", RecordStatus::Active)
        .await
        .unwrap();
    let service = app.db.insert_service("Streaming", "", 30).await.unwrap();
    let engine = app.app.gateway().engine().clone();

    let tasks = (0..8).map(|_| {
        let engine = engine.clone();
        let model = create_request(user.id, service.id);
        tokio::spawn(async move { engine.create(&model).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.kind() == ErrorKind::DuplicateSubscription));
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn cancel_and_renew_against_postgres() {
    let app = PostgresTestApp::spawn().await;
    let user = app
        .db
        .insert_user("carol", "pw", RecordStatus::Active)
        .await
        .unwrap();
    let service = app.db.insert_service("Music", "", 30).await.unwrap();
    let engine = app.app.gateway().engine();

    let created = engine
        .create(&create_request(user.id, service.id))
        .await
        .unwrap();
    engine.cancel(created.id, Some(user.id)).await.unwrap();
    assert!(!engine.check_active(user.id, service.id).await.unwrap());

    let renewed = engine
        .renew(created.id, &Default::default())
        .await
        .unwrap();
    assert!(renewed.is_active());
    assert!(renewed.end_date > created.end_date);
}
