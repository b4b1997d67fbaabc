//! Races on token issuance, subscription uniqueness and lifecycle writes.

mod common;

use common::{create_request, TestApp, ALICE, ALICE_PASSWORD};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use subscription_service::models::{SubscriptionModel, SubscriptionStatus};
use subscription_service::services::{ErrorKind, TokenStore};
use subscription_service::utils::add_months;

const PARALLELISM: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_authentications_leave_one_active_token() {
    let app = Arc::new(TestApp::spawn().await);

    let tasks = (0..PARALLELISM).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { app.gateway().authenticate(ALICE, ALICE_PASSWORD).await })
    });
    let tokens: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().token)
        .collect();

    let distinct: HashSet<_> = tokens.iter().collect();
    assert_eq!(distinct.len(), PARALLELISM);

    let active = app.store.find_active_tokens(app.alice_id).await.unwrap();
    assert_eq!(active.len(), 1);

    let mut valid = 0;
    for token in &tokens {
        if app.gateway().validate(token).await.is_ok() {
            valid += 1;
        }
    }
    assert_eq!(valid, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_creates_for_same_pair_yield_one_subscription() {
    let app = Arc::new(TestApp::spawn().await);

    let tasks = (0..PARALLELISM).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            app.gateway()
                .engine()
                .create(&create_request(app.alice_id, app.streaming_id))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::DuplicateSubscription))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, PARALLELISM - 1);

    let all = app.gateway().engine().list_all().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_users_authenticate_independently() {
    let app = Arc::new(TestApp::spawn().await);

    let alice = {
        let app = app.clone();
        tokio::spawn(async move { app.alice_token().await })
    };
    let bob = {
        let app = app.clone();
        tokio::spawn(async move { app.bob_token().await })
    };
    let (alice, bob) = (alice.await.unwrap(), bob.await.unwrap());

    assert!(app.gateway().validate(&alice).await.unwrap());
    assert!(app.gateway().validate(&bob).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn updates_racing_a_cancel_never_revive_it() {
    let app = Arc::new(TestApp::spawn().await);
    let created = app
        .gateway()
        .engine()
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();
    let id = created.id;

    let updates = (0..4).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let model = SubscriptionModel {
                updated_by: Some(format!("writer-{}", i)),
                ..Default::default()
            };
            app.gateway().engine().update(id, &model).await
        })
    });
    let cancel = {
        let app = app.clone();
        tokio::spawn(async move { app.gateway().engine().cancel(id, None).await })
    };

    for result in join_all(updates).await {
        result.unwrap().unwrap();
    }
    cancel.await.unwrap().unwrap();

    let stored = app.gateway().engine().get(id).await.unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Cancelled);
    assert!(!app
        .gateway()
        .engine()
        .check_active(app.alice_id, app.streaming_id)
        .await
        .unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_renewals_each_extend_the_term() {
    const RENEWALS: usize = 5;
    let app = Arc::new(TestApp::spawn().await);
    let created = app
        .gateway()
        .engine()
        .create(&create_request(app.alice_id, app.streaming_id))
        .await
        .unwrap();
    let id = created.id;

    let tasks = (0..RENEWALS).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            app.gateway()
                .engine()
                .renew(id, &SubscriptionModel::default())
                .await
        })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let mut expected_end = created.end_date;
    for _ in 0..RENEWALS {
        expected_end = add_months(expected_end, 1).unwrap();
    }
    let stored = app.gateway().engine().get(id).await.unwrap();
    assert_eq!(stored.end_date, expected_end);
    assert_eq!(stored.status, SubscriptionStatus::Active);
}
