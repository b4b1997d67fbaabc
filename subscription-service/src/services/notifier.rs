//! Subscription event notification.
//!
//! Events are dispatched on a detached task. Delivery failures are logged and
//! never reach the caller of the lifecycle operation.

use crate::models::{Subscription, SubscriptionStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Created,
    Renewed,
    Cancelled,
}

impl SubscriptionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEventKind::Created => "created",
            SubscriptionEventKind::Renewed => "renewed",
            SubscriptionEventKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEvent {
    pub kind: SubscriptionEventKind,
    pub subscription_id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub status: SubscriptionStatus,
    pub end_date: NaiveDate,
    pub occurred_utc: DateTime<Utc>,
}

impl SubscriptionEvent {
    pub fn new(kind: SubscriptionEventKind, subscription: &Subscription) -> Self {
        Self {
            kind,
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            service_id: subscription.service_id,
            status: subscription.status,
            end_date: subscription.end_date,
            occurred_utc: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SubscriptionNotifier: Send + Sync {
    async fn notify(&self, event: &SubscriptionEvent) -> Result<(), AppError>;
}

/// Default notifier: writes the event to the structured log.
#[derive(Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl SubscriptionNotifier for LoggingNotifier {
    async fn notify(&self, event: &SubscriptionEvent) -> Result<(), AppError> {
        tracing::info!(
            event = event.kind.as_str(),
            subscription_id = event.subscription_id,
            user_id = event.user_id,
            service_id = event.service_id,
            status = %event.status,
            end_date = %event.end_date,
            "Subscription event"
        );
        Ok(())
    }
}

/// Keeps every event in memory; used by tests.
#[derive(Default)]
pub struct MockNotifier {
    pub events: Mutex<Vec<SubscriptionEvent>>,
    pub fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<SubscriptionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SubscriptionNotifier for MockNotifier {
    async fn notify(&self, event: &SubscriptionEvent) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::ServiceUnavailable);
        }
        self.events
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Mock notifier mutex poisoned: {}", e)))?
            .push(event.clone());
        Ok(())
    }
}

/// Fire-and-forget dispatch. The handle is returned only so tests can await
/// delivery.
pub fn dispatch(
    notifier: Arc<dyn SubscriptionNotifier>,
    event: SubscriptionEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(
                error = %e,
                event = event.kind.as_str(),
                subscription_id = event.subscription_id,
                "Subscription notification failed"
            );
        }
    })
}
