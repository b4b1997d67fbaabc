//! Storage seams consulted by the token manager and the subscription engine.
//!
//! Implementations return the shared [`AppError`]. A uniqueness violation is
//! reported as [`AppError::Conflict`]; anything else unexpected as
//! [`AppError::DatabaseError`].

use crate::models::{
    AuthToken, CreateSubscription, NewAuthToken, RecordStatus, ServiceOffering, Subscription,
    SubscriptionStatus, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

/// Read-only view of user accounts.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Deactivate every active token of the user and persist `token` as the
    /// only active one, atomically with respect to other issuances for the
    /// same user.
    async fn issue_token(&self, token: &NewAuthToken) -> Result<AuthToken, AppError>;
    async fn find_token(&self, token: &str) -> Result<Option<AuthToken>, AppError>;
    async fn find_active_tokens(&self, user_id: i64) -> Result<Vec<AuthToken>, AppError>;
    /// Flip one token to inactive. Returns false if it was already inactive.
    async fn expire_token(&self, token_id: i64, actor: &str) -> Result<bool, AppError>;
    /// Flip every active token whose expiry is before `now`.
    async fn expire_tokens_before(&self, now: DateTime<Utc>, actor: &str)
        -> Result<u64, AppError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Fails with `Conflict` if the row would be a second active subscription
    /// for the same user and service.
    async fn insert_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError>;
    /// Replace the mutable fields of a row, provided it still has the status
    /// and last update time of `expected`. `None` if the row vanished or was
    /// changed since `expected` was read.
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected: &Subscription,
    ) -> Result<Option<Subscription>, AppError>;
    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, AppError>;
    async fn find_subscriptions_by_user(&self, user_id: i64)
        -> Result<Vec<Subscription>, AppError>;
    /// Subscriptions of a user whose coarse status is `status`.
    async fn find_subscriptions_by_user_and_status(
        &self,
        user_id: i64,
        status: RecordStatus,
    ) -> Result<Vec<Subscription>, AppError>;
    async fn subscription_exists(
        &self,
        user_id: i64,
        service_id: i64,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, AppError>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn find_service(&self, service_id: i64) -> Result<Option<ServiceOffering>, AppError>;
}
