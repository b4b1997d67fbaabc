//! In-process store used for local runs and tests.
//!
//! One mutex guards all tables, so token issuance and the subscription
//! uniqueness check-and-write are each a single critical section.

use crate::models::{
    AuthToken, CreateSubscription, NewAuthToken, RecordStatus, ServiceOffering, Subscription,
    SubscriptionStatus, User,
};
use crate::services::store::{IdentityStore, ServiceCatalog, SubscriptionStore, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    services: BTreeMap<i64, ServiceOffering>,
    tokens: BTreeMap<i64, AuthToken>,
    token_index: HashMap<String, i64>,
    subscriptions: BTreeMap<i64, Subscription>,
    next_user_id: i64,
    next_service_id: i64,
    next_token_id: i64,
    next_subscription_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn active_conflict(&self, user_id: i64, service_id: i64, except: Option<i64>) -> bool {
        self.subscriptions.values().any(|s| {
            s.user_id == user_id
                && s.service_id == service_id
                && s.status.is_active()
                && Some(s.id) != except
        })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "In-memory store marked unavailable"
            )));
        }
        self.tables
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Store mutex poisoned: {}", e)))
    }

    /// Make every subsequent operation fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    // Seeding: users and services belong to other systems.

    pub fn add_user(&self, username: &str, password: &str) -> Result<User, AppError> {
        self.add_user_with_status(username, password, RecordStatus::Active)
    }

    pub fn add_user_with_status(
        &self,
        username: &str,
        password: &str,
        status: RecordStatus,
    ) -> Result<User, AppError> {
        let mut tables = self.lock()?;
        if tables
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(username))
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Username '{}' already exists",
                username
            )));
        }
        let id = Tables::next_id(&mut tables.next_user_id);
        let user = User::new(id, username, password).with_status(status);
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    pub fn set_user_status(&self, user_id: i64, status: RecordStatus) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", user_id)))?;
        user.status = status;
        user.updated_utc = Utc::now();
        Ok(())
    }

    pub fn remove_user(&self, user_id: i64) -> Result<(), AppError> {
        self.lock()?.users.remove(&user_id);
        Ok(())
    }

    pub fn add_service(&self, name: &str, duration_days: i32) -> Result<ServiceOffering, AppError> {
        let mut tables = self.lock()?;
        let id = Tables::next_id(&mut tables.next_service_id);
        let service = ServiceOffering::new(id, name, duration_days);
        tables.services.insert(id, service.clone());
        Ok(service)
    }

    /// Move a token's expiry, e.g. into the past.
    pub fn set_token_expiry(&self, token: &str, expiry_utc: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.lock()?;
        let id = *tables
            .token_index
            .get(token)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Token not found")))?;
        if let Some(t) = tables.tokens.get_mut(&id) {
            t.expiry_utc = expiry_utc;
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryStore {
    async fn find_service(&self, service_id: i64) -> Result<Option<ServiceOffering>, AppError> {
        Ok(self.lock()?.services.get(&service_id).cloned())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn issue_token(&self, token: &NewAuthToken) -> Result<AuthToken, AppError> {
        let mut tables = self.lock()?;
        if tables.token_index.contains_key(&token.token) {
            return Err(AppError::Conflict(anyhow::anyhow!("Token value already issued")));
        }

        for existing in tables
            .tokens
            .values_mut()
            .filter(|t| t.user_id == token.user_id && t.status.is_active())
        {
            existing.status = RecordStatus::Inactive;
            existing.updated_by = token.actor.clone();
            existing.updated_utc = token.issued_utc;
        }

        let id = Tables::next_id(&mut tables.next_token_id);
        let issued = AuthToken {
            id,
            token: token.token.clone(),
            user_id: token.user_id,
            issued_utc: token.issued_utc,
            expiry_utc: token.expiry_utc,
            status: RecordStatus::Active,
            created_by: token.actor.clone(),
            updated_by: token.actor.clone(),
            created_utc: token.issued_utc,
            updated_utc: token.issued_utc,
        };
        tables.token_index.insert(issued.token.clone(), id);
        tables.tokens.insert(id, issued.clone());
        Ok(issued)
    }

    async fn find_token(&self, token: &str) -> Result<Option<AuthToken>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .token_index
            .get(token)
            .and_then(|id| tables.tokens.get(id))
            .cloned())
    }

    async fn find_active_tokens(&self, user_id: i64) -> Result<Vec<AuthToken>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.status.is_active())
            .cloned()
            .collect())
    }

    async fn expire_token(&self, token_id: i64, actor: &str) -> Result<bool, AppError> {
        let mut tables = self.lock()?;
        match tables.tokens.get_mut(&token_id) {
            Some(t) if t.status.is_active() => {
                t.status = RecordStatus::Inactive;
                t.updated_by = actor.to_string();
                t.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_tokens_before(
        &self,
        now: DateTime<Utc>,
        actor: &str,
    ) -> Result<u64, AppError> {
        let mut tables = self.lock()?;
        let mut count = 0;
        for t in tables
            .tokens
            .values_mut()
            .filter(|t| t.status.is_active() && t.expiry_utc < now)
        {
            t.status = RecordStatus::Inactive;
            t.updated_by = actor.to_string();
            t.updated_utc = now;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn insert_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let mut tables = self.lock()?;
        if input.status.is_active() && tables.active_conflict(input.user_id, input.service_id, None)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Active subscription exists for user {} and service {}",
                input.user_id,
                input.service_id
            )));
        }

        let id = Tables::next_id(&mut tables.next_subscription_id);
        let subscription = Subscription {
            id,
            user_id: input.user_id,
            service_id: input.service_id,
            start_date: input.start_date,
            end_date: input.end_date,
            status: input.status,
            created_by: input.actor.clone(),
            updated_by: input.actor.clone(),
            created_utc: input.created_utc,
            updated_utc: input.created_utc,
        };
        tables.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected: &Subscription,
    ) -> Result<Option<Subscription>, AppError> {
        let mut tables = self.lock()?;
        match tables.subscriptions.get(&subscription.id) {
            Some(current)
                if current.status == expected.status
                    && current.updated_utc == expected.updated_utc => {}
            _ => return Ok(None),
        }
        if subscription.status.is_active()
            && tables.active_conflict(
                subscription.user_id,
                subscription.service_id,
                Some(subscription.id),
            )
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Active subscription exists for user {} and service {}",
                subscription.user_id,
                subscription.service_id
            )));
        }

        let stored = tables
            .subscriptions
            .get_mut(&subscription.id)
            .map(|existing| {
                existing.user_id = subscription.user_id;
                existing.service_id = subscription.service_id;
                existing.start_date = subscription.start_date;
                existing.end_date = subscription.end_date;
                existing.status = subscription.status;
                existing.updated_by = subscription.updated_by.clone();
                existing.updated_utc = subscription.updated_utc;
                existing.clone()
            });
        Ok(stored)
    }

    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, AppError> {
        Ok(self.lock()?.subscriptions.get(&id).cloned())
    }

    async fn find_subscriptions_by_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Subscription>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_subscriptions_by_user_and_status(
        &self,
        user_id: i64,
        status: RecordStatus,
    ) -> Result<Vec<Subscription>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.record_status() == status)
            .cloned()
            .collect())
    }

    async fn subscription_exists(
        &self,
        user_id: i64,
        service_id: i64,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .subscriptions
            .values()
            .any(|s| s.user_id == user_id && s.service_id == service_id && s.status == status))
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, AppError> {
        Ok(self.lock()?.subscriptions.values().cloned().collect())
    }
}
