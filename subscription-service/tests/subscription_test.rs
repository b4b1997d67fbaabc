//! Subscription creation and lookup tests.

mod common;

use chrono::Duration;
use common::{create_request, TestApp};
use subscription_service::models::{RecordStatus, SubscriptionModel, SubscriptionStatus};
use subscription_service::services::ErrorKind;
use subscription_service::utils::{add_months, format_compact_date, today};

#[tokio::test]
async fn create_starting_today_works() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let created = engine
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();

    assert_eq!(created.user_id, app.alice_id);
    assert_eq!(created.service_id, app.streaming_id);
    assert_eq!(created.start_date, today());
    assert_eq!(created.end_date, add_months(today(), 1).unwrap());
    assert_eq!(created.status, SubscriptionStatus::Active);
    assert!(engine
        .check_active(app.alice_id, app.streaming_id)
        .await
        .unwrap());
    assert!(!engine.check_active(app.alice_id, app.music_id).await.unwrap());
}

#[tokio::test]
async fn create_starting_yesterday_fails() {
    let app = TestApp::spawn().await;
    let mut model = create_request(app.alice_id, app.streaming_id);
    model.start_date = Some(format_compact_date(today() - Duration::days(1)));

    let err = app.gateway().engine().create(&model).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDate);
}

#[tokio::test]
async fn create_rejects_malformed_dates() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    for bad in ["2030-01-01", "2030011", "203001011", "20301301", "abcdefgh", ""] {
        let mut model = create_request(app.alice_id, app.streaming_id);
        model.start_date = Some(bad.to_string());
        let err = engine.create(&model).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDate, "start date {:?}", bad);
    }

    let mut model = create_request(app.alice_id, app.streaming_id);
    model.start_date = None;
    assert_eq!(
        engine.create(&model).await.unwrap_err().kind(),
        ErrorKind::InvalidDate
    );

    let mut model = create_request(app.alice_id, app.streaming_id);
    model.end_date = Some("tomorrow".to_string());
    assert_eq!(
        engine.create(&model).await.unwrap_err().kind(),
        ErrorKind::InvalidDate
    );
}

#[tokio::test]
async fn create_inactive_fails_regardless_of_other_fields() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let mut model = create_request(app.alice_id, app.streaming_id);
    model.status = None;
    model.dbstatus = Some(RecordStatus::Inactive);
    let err = engine.create(&model).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStatus);

    // Garbage everywhere else still reports the status first.
    let model = SubscriptionModel {
        user_id: Some("-1".to_string()),
        service_id: Some("x".to_string()),
        start_date: Some("yesterday".to_string()),
        dbstatus: Some(RecordStatus::Inactive),
        ..Default::default()
    };
    let err = engine.create(&model).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStatus);

    assert!(!engine
        .check_active(app.alice_id, app.streaming_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn create_accepts_coarse_active_status() {
    let app = TestApp::spawn().await;
    let mut model = create_request(app.alice_id, app.streaming_id);
    model.status = None;
    model.dbstatus = Some(RecordStatus::Active);

    let created = app.gateway().engine().create(&model).await.unwrap();
    assert_eq!(created.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn create_rejects_malformed_ids() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let mut model = create_request(app.alice_id, app.streaming_id);
    model.user_id = Some("0".to_string());
    assert_eq!(
        engine.create(&model).await.unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let mut model = create_request(app.alice_id, app.streaming_id);
    model.service_id = None;
    assert_eq!(
        engine.create(&model).await.unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[tokio::test]
async fn create_for_unknown_user_or_service_fails() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let err = engine
        .create(&create_request(999, app.streaming_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine
        .create(&create_request(app.alice_id, 999))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn duplicate_active_subscription_is_rejected() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    engine
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();
    let err = engine
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSubscription);

    // Other pairs are unaffected.
    engine
        .create(&create_request(app.alice_id, app.music_id))
        .await
        .unwrap();
    engine
        .create(&create_request(app.bob_id, app.streaming_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn created_by_defaults_to_system_actor() {
    let app = TestApp::spawn_with(|config| {
        config.subscription.system_actor = "scheduler".to_string();
    })
    .await;
    let engine = app.gateway().engine();

    let created = engine
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();
    assert_eq!(created.created_by, "scheduler");
    assert_eq!(created.updated_by, "scheduler");

    let mut model = create_request(app.alice_id, app.music_id);
    model.created_by = Some("alice".to_string());
    let created = engine.create(&model).await.unwrap();
    assert_eq!(created.created_by, "alice");
}

#[tokio::test]
async fn explicit_end_date_is_kept() {
    let app = TestApp::spawn().await;
    let mut model = create_request(app.alice_id, app.streaming_id);
    let end = today() + Duration::days(90);
    model.end_date = Some(format_compact_date(end));

    let created = app.gateway().engine().create(&model).await.unwrap();
    assert_eq!(created.end_date, end);
}

#[tokio::test]
async fn get_and_list() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let first = engine
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();
    engine
        .create(&create_request(app.alice_id, app.music_id))
        .await
        .unwrap();
    engine
        .create(&create_request(app.bob_id, app.music_id))
        .await
        .unwrap();

    assert_eq!(engine.get(first.id).await.unwrap(), first);
    assert_eq!(engine.list_by_user(app.alice_id).await.unwrap().len(), 2);
    assert_eq!(engine.list_all().await.unwrap().len(), 3);

    let err = engine.get(404).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Subscription with ID '404' not found");
}

#[tokio::test]
async fn list_by_user_reports_missing_user_and_empty_result() {
    let app = TestApp::spawn().await;
    let engine = app.gateway().engine();

    let err = engine.list_by_user(999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = engine.list_by_user(app.bob_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
