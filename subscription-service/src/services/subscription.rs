//! Subscription lifecycle engine.
//!
//! Creation enters `Active` only. Cancel is terminal; only renewal brings a
//! cancelled subscription back. For a (user, service) pair at most one
//! subscription is active; the store enforces it and a conflict surfaces as
//! `DuplicateSubscription`.

use crate::config::SubscriptionPolicy;
use crate::models::{
    CreateSubscription, RecordStatus, Subscription, SubscriptionModel, SubscriptionStatus,
};
use crate::services::error::ServiceError;
use crate::services::metrics::record_subscription_operation;
use crate::services::notifier::{
    dispatch, SubscriptionEvent, SubscriptionEventKind, SubscriptionNotifier,
};
use crate::services::store::{IdentityStore, ServiceCatalog, SubscriptionStore};
use crate::utils::{add_months, today};
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Unique violations on write become duplicates; everything else is internal.
fn write_error(err: AppError) -> ServiceError {
    match err {
        AppError::Conflict(_) => ServiceError::DuplicateSubscription,
        other => other.into(),
    }
}

/// Read-modify-write rounds before giving up on a contended subscription.
const MAX_WRITE_ATTEMPTS: usize = 10;

fn write_contention(id: i64) -> ServiceError {
    AppError::Conflict(anyhow::anyhow!(
        "Subscription {} kept changing during {} write attempts",
        id,
        MAX_WRITE_ATTEMPTS
    ))
    .into()
}

fn record_outcome<T>(operation: &str, result: &Result<T, ServiceError>) {
    match result {
        Ok(_) => record_subscription_operation(operation, "success"),
        Err(e) => {
            warn!(operation, kind = %e.kind(), error = %e, "Subscription operation rejected");
            record_subscription_operation(operation, e.kind().as_str());
        }
    }
}

fn require_positive(field: &str, value: i64) -> Result<i64, ServiceError> {
    if value <= 0 {
        return Err(ServiceError::InvalidArgument(format!(
            "{} must be a positive integer, got {}",
            field, value
        )));
    }
    Ok(value)
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct SubscriptionEngine {
    identity: Arc<dyn IdentityStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    catalog: Arc<dyn ServiceCatalog>,
    notifier: Arc<dyn SubscriptionNotifier>,
    policy: SubscriptionPolicy,
}

impl SubscriptionEngine {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn ServiceCatalog>,
        notifier: Arc<dyn SubscriptionNotifier>,
        policy: SubscriptionPolicy,
    ) -> Self {
        Self {
            identity,
            subscriptions,
            catalog,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> &SubscriptionPolicy {
        &self.policy
    }

    fn notify(&self, kind: SubscriptionEventKind, subscription: &Subscription) {
        dispatch(
            self.notifier.clone(),
            SubscriptionEvent::new(kind, subscription),
        );
    }

    fn renewal_end(&self, from: NaiveDate) -> Result<NaiveDate, ServiceError> {
        add_months(from, self.policy.renewal_months).ok_or_else(|| {
            ServiceError::InvalidDate(format!("End date after {} is out of range", from))
        })
    }

    async fn ensure_user(&self, user_id: i64) -> Result<(), ServiceError> {
        self.identity
            .find_user_by_id(user_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::user_not_found(user_id))
    }

    async fn ensure_service(&self, service_id: i64) -> Result<(), ServiceError> {
        self.catalog
            .find_service(service_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Service with ID {} not found", service_id))
            })
    }

    async fn load(&self, id: i64) -> Result<Subscription, ServiceError> {
        require_positive("id", id)?;
        self.subscriptions
            .find_subscription(id)
            .await?
            .ok_or_else(|| ServiceError::subscription_not_found(id))
    }

    /// Write `updated` only if the stored row is still `expected`. `None`
    /// means another writer got there first.
    async fn compare_and_write(
        &self,
        updated: &Subscription,
        expected: &Subscription,
    ) -> Result<Option<Subscription>, ServiceError> {
        let written = self
            .subscriptions
            .update_subscription(updated, expected)
            .await
            .map_err(write_error)?;
        if written.is_none() {
            debug!(subscription_id = expected.id, "Subscription changed concurrently, re-reading");
        }
        Ok(written)
    }

    /// Create an active subscription.
    #[instrument(skip(self, model), fields(user_id = ?model.user_id, service_id = ?model.service_id))]
    pub async fn create(&self, model: &SubscriptionModel) -> Result<Subscription, ServiceError> {
        let result = self.create_inner(model).await;
        record_outcome("create", &result);
        result
    }

    async fn create_inner(&self, model: &SubscriptionModel) -> Result<Subscription, ServiceError> {
        match model.requested_status() {
            None => {
                return Err(ServiceError::InvalidStatus(
                    "Subscription status is required".to_string(),
                ))
            }
            Some(SubscriptionStatus::Active) => {}
            Some(SubscriptionStatus::Inactive) => {
                return Err(ServiceError::InvalidStatus(
                    "Cannot create inactive subscriptions".to_string(),
                ))
            }
            Some(other) => {
                return Err(ServiceError::InvalidStatus(format!(
                    "Cannot create a subscription with status {}",
                    other
                )))
            }
        }

        let user_id = model
            .parsed_user_id()?
            .ok_or_else(|| ServiceError::InvalidArgument("userId is required".to_string()))?;
        let service_id = model
            .parsed_service_id()?
            .ok_or_else(|| ServiceError::InvalidArgument("serviceId is required".to_string()))?;

        let start_date = model
            .parsed_start_date()?
            .ok_or_else(|| ServiceError::InvalidDate("startDate is required".to_string()))?;
        if start_date < today() {
            return Err(ServiceError::InvalidDate(
                "Start date cannot be before today".to_string(),
            ));
        }

        let end_date = match model.parsed_end_date()? {
            Some(end_date) => {
                if end_date <= start_date {
                    return Err(ServiceError::InvalidDate(
                        "End date must be after start date".to_string(),
                    ));
                }
                if let Some(max_days) = self.policy.max_span_days {
                    if (end_date - start_date).num_days() > max_days {
                        return Err(ServiceError::InvalidDate(format!(
                            "Subscription cannot span more than {} days",
                            max_days
                        )));
                    }
                }
                end_date
            }
            None => self.renewal_end(start_date)?,
        };

        self.ensure_user(user_id).await?;
        self.ensure_service(service_id).await?;

        if self.active_exists(user_id, service_id).await? {
            return Err(ServiceError::DuplicateSubscription);
        }

        let actor = non_blank(model.created_by.as_ref())
            .unwrap_or_else(|| self.policy.system_actor.clone());
        let input = CreateSubscription {
            user_id,
            service_id,
            start_date,
            end_date,
            status: SubscriptionStatus::Active,
            actor,
            created_utc: Utc::now(),
        };

        let subscription = self
            .subscriptions
            .insert_subscription(&input)
            .await
            .map_err(write_error)?;

        info!(
            subscription_id = subscription.id,
            user_id,
            service_id,
            end_date = %subscription.end_date,
            "Subscription created"
        );
        self.notify(SubscriptionEventKind::Created, &subscription);

        Ok(subscription)
    }

    /// Apply the supplied fields of `model` to an existing subscription.
    #[instrument(skip(self, model))]
    pub async fn update(
        &self,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<Subscription, ServiceError> {
        let result = self.update_inner(id, model).await;
        record_outcome("update", &result);
        result
    }

    async fn update_inner(
        &self,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<Subscription, ServiceError> {
        let mut current = self.load(id).await?;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let updated = self.apply_update(&current, model).await?;
            if let Some(stored) = self.compare_and_write(&updated, &current).await? {
                info!(subscription_id = id, status = %stored.status, "Subscription updated");
                return Ok(stored);
            }
            current = self.load(id).await?;
        }
        Err(write_contention(id))
    }

    async fn apply_update(
        &self,
        existing: &Subscription,
        model: &SubscriptionModel,
    ) -> Result<Subscription, ServiceError> {
        let mut updated = existing.clone();

        if let Some(user_id) = model.parsed_user_id()? {
            updated.user_id = user_id;
        }
        if let Some(service_id) = model.parsed_service_id()? {
            updated.service_id = service_id;
        }
        if let Some(start_date) = model.parsed_start_date()? {
            updated.start_date = start_date;
        }
        if let Some(end_date) = model.parsed_end_date()? {
            updated.end_date = end_date;
        }
        if updated.end_date <= updated.start_date {
            return Err(ServiceError::InvalidDate(
                "End date must be after start date".to_string(),
            ));
        }

        if let Some(status) = model.requested_status() {
            if !existing.status.can_transition_to(status) {
                return Err(ServiceError::InvalidStatus(
                    "Cannot reactivate a cancelled subscription; renew it instead".to_string(),
                ));
            }
            updated.status = status;
        }

        if updated.user_id != existing.user_id {
            self.ensure_user(updated.user_id).await?;
        }
        if updated.service_id != existing.service_id {
            self.ensure_service(updated.service_id).await?;
        }

        updated.updated_by = non_blank(model.updated_by.as_ref())
            .unwrap_or_else(|| self.policy.system_actor.clone());
        updated.updated_utc = Utc::now();

        Ok(updated)
    }

    /// Extend the end date by the renewal period and reactivate.
    #[instrument(skip(self, model))]
    pub async fn renew(
        &self,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<Subscription, ServiceError> {
        let result = self.renew_inner(id, model).await;
        record_outcome("renew", &result);
        result
    }

    async fn renew_inner(
        &self,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<Subscription, ServiceError> {
        let mut current = self.load(id).await?;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut renewed = current.clone();
            renewed.end_date = self.renewal_end(current.end_date)?;
            renewed.status = SubscriptionStatus::Active;
            renewed.updated_by = non_blank(model.updated_by.as_ref())
                .unwrap_or_else(|| self.policy.system_actor.clone());
            renewed.updated_utc = Utc::now();

            if let Some(stored) = self.compare_and_write(&renewed, &current).await? {
                info!(
                    subscription_id = id,
                    previous_end_date = %current.end_date,
                    end_date = %stored.end_date,
                    "Subscription renewed"
                );
                self.notify(SubscriptionEventKind::Renewed, &stored);
                return Ok(stored);
            }
            current = self.load(id).await?;
        }
        Err(write_contention(id))
    }

    /// Cancel a subscription, optionally on behalf of a specific user who
    /// must own it. Cancelling twice is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: i64,
        user_id: Option<i64>,
    ) -> Result<Subscription, ServiceError> {
        let result = self.cancel_inner(id, user_id).await;
        record_outcome("cancel", &result);
        result
    }

    async fn cancel_inner(
        &self,
        id: i64,
        user_id: Option<i64>,
    ) -> Result<Subscription, ServiceError> {
        let mut current = self.load(id).await?;

        let actor = match user_id {
            Some(user_id) => {
                self.identity
                    .find_user_by_id(user_id)
                    .await?
                    .ok_or_else(|| ServiceError::user_not_found(user_id))?
                    .username
            }
            None => self.policy.system_actor.clone(),
        };

        for _ in 0..MAX_WRITE_ATTEMPTS {
            if let Some(user_id) = user_id {
                if current.user_id != user_id {
                    return Err(ServiceError::Unauthorized(format!(
                        "User {} does not own subscription {}",
                        user_id, id
                    )));
                }
            }

            if current.status == SubscriptionStatus::Cancelled {
                info!(subscription_id = id, "Subscription already cancelled");
                return Ok(current);
            }

            let mut cancelled = current.clone();
            cancelled.status = SubscriptionStatus::Cancelled;
            cancelled.updated_by = actor.clone();
            cancelled.updated_utc = Utc::now();

            if let Some(stored) = self.compare_and_write(&cancelled, &current).await? {
                info!(subscription_id = id, user_id = stored.user_id, "Subscription cancelled");
                self.notify(SubscriptionEventKind::Cancelled, &stored);
                return Ok(stored);
            }
            current = self.load(id).await?;
        }
        Err(write_contention(id))
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Subscription, ServiceError> {
        self.load(id).await
    }

    /// All subscriptions of a user. An empty result is reported as not found.
    #[instrument(skip(self))]
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Subscription>, ServiceError> {
        require_positive("userId", user_id)?;
        self.ensure_user(user_id).await?;

        let subscriptions = self.subscriptions.find_subscriptions_by_user(user_id).await?;
        if subscriptions.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No subscriptions found for user {}",
                user_id
            )));
        }
        Ok(subscriptions)
    }

    /// Subscriptions of a user with the given coarse status. Only active
    /// subscriptions may be listed this way; an empty result is not an error.
    #[instrument(skip(self))]
    pub async fn list_by_user_and_status(
        &self,
        user_id: i64,
        status: RecordStatus,
    ) -> Result<Vec<Subscription>, ServiceError> {
        if status == RecordStatus::Inactive {
            return Err(ServiceError::InvalidStatus(
                "Cannot list subscriptions by inactive status".to_string(),
            ));
        }
        require_positive("userId", user_id)?;
        self.ensure_user(user_id).await?;

        Ok(self
            .subscriptions
            .find_subscriptions_by_user_and_status(user_id, status)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Subscription>, ServiceError> {
        Ok(self.subscriptions.list_subscriptions().await?)
    }

    /// True if the user holds an active subscription to the service.
    #[instrument(skip(self))]
    pub async fn check_active(&self, user_id: i64, service_id: i64) -> Result<bool, ServiceError> {
        require_positive("userId", user_id)?;
        require_positive("serviceId", service_id)?;
        self.active_exists(user_id, service_id).await
    }

    async fn active_exists(&self, user_id: i64, service_id: i64) -> Result<bool, ServiceError> {
        Ok(self
            .subscriptions
            .subscription_exists(user_id, service_id, SubscriptionStatus::Active)
            .await?)
    }
}
