//! Boundary layer in front of the token manager and the lifecycle engine.
//!
//! Every subscription call checks the presented token first and binds it to
//! the user the call acts on. Only then is the engine invoked.

use crate::models::{RecordStatus, SubscriptionModel, TokenResponse};
use crate::services::error::ServiceError;
use crate::services::subscription::SubscriptionEngine;
use crate::services::token::TokenManager;
use tracing::instrument;

#[derive(Clone)]
pub struct SubscriptionGateway {
    tokens: TokenManager,
    engine: SubscriptionEngine,
}

impl SubscriptionGateway {
    pub fn new(tokens: TokenManager, engine: SubscriptionEngine) -> Self {
        Self { tokens, engine }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn engine(&self) -> &SubscriptionEngine {
        &self.engine
    }

    /// Validate the token, then bind it to the owner of subscription `id`.
    async fn authorize_owner(&self, token: &str, id: i64) -> Result<i64, ServiceError> {
        let engine = &self.engine;
        self.tokens
            .authorize_with(token, || async move {
                let subscription = engine.get(id).await?;
                Ok::<_, ServiceError>(subscription.user_id)
            })
            .await
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ServiceError> {
        self.tokens.authenticate(username, password).await
    }

    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<bool, ServiceError> {
        self.tokens.validate(token).await
    }

    #[instrument(skip(self, token))]
    pub async fn authorize(&self, token: &str, user_id: i64) -> Result<i64, ServiceError> {
        self.tokens.authorize(token, user_id).await
    }

    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.tokens.invalidate(token).await
    }

    #[instrument(skip_all)]
    pub async fn refresh(&self, token: &str) -> Result<TokenResponse, ServiceError> {
        self.tokens.refresh(token).await
    }

    /// The token must belong to the user named in the model. A model without
    /// a usable user id only needs a valid token; the engine then rejects it.
    #[instrument(skip(self, token, model))]
    pub async fn create_subscription(
        &self,
        token: &str,
        model: &SubscriptionModel,
    ) -> Result<SubscriptionModel, ServiceError> {
        match model.parsed_user_id().ok().flatten() {
            Some(user_id) => {
                self.tokens.authorize(token, user_id).await?;
            }
            None => {
                self.tokens.validate(token).await?;
            }
        }
        let created = self.engine.create(model).await?;
        Ok(SubscriptionModel::from_entity(&created))
    }

    #[instrument(skip(self, token, model))]
    pub async fn update_subscription(
        &self,
        token: &str,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<SubscriptionModel, ServiceError> {
        self.authorize_owner(token, id).await?;
        let updated = self.engine.update(id, model).await?;
        Ok(SubscriptionModel::from_entity(&updated))
    }

    #[instrument(skip(self, token, model))]
    pub async fn renew_subscription(
        &self,
        token: &str,
        id: i64,
        model: &SubscriptionModel,
    ) -> Result<(), ServiceError> {
        self.authorize_owner(token, id).await?;
        self.engine.renew(id, model).await?;
        Ok(())
    }

    /// Bound to `user_id` when supplied, otherwise to the subscription owner.
    #[instrument(skip(self, token))]
    pub async fn cancel_subscription(
        &self,
        token: &str,
        id: i64,
        user_id: Option<i64>,
    ) -> Result<(), ServiceError> {
        match user_id {
            Some(user_id) => {
                self.tokens.authorize(token, user_id).await?;
            }
            None => {
                self.authorize_owner(token, id).await?;
            }
        }
        self.engine.cancel(id, user_id).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    pub async fn get_subscription(
        &self,
        token: &str,
        id: i64,
    ) -> Result<SubscriptionModel, ServiceError> {
        self.authorize_owner(token, id).await?;
        let subscription = self.engine.get(id).await?;
        Ok(SubscriptionModel::from_entity(&subscription))
    }

    #[instrument(skip(self, token))]
    pub async fn list_subscriptions(
        &self,
        token: &str,
        user_id: i64,
    ) -> Result<Vec<SubscriptionModel>, ServiceError> {
        self.tokens.authorize(token, user_id).await?;
        let subscriptions = self.engine.list_by_user(user_id).await?;
        Ok(subscriptions.iter().map(SubscriptionModel::from_entity).collect())
    }

    /// Bound to the user. Only the active status may be requested.
    #[instrument(skip(self, token))]
    pub async fn list_subscriptions_by_status(
        &self,
        token: &str,
        user_id: i64,
        status: RecordStatus,
    ) -> Result<Vec<SubscriptionModel>, ServiceError> {
        self.tokens.authorize(token, user_id).await?;
        let subscriptions = self.engine.list_by_user_and_status(user_id, status).await?;
        Ok(subscriptions.iter().map(SubscriptionModel::from_entity).collect())
    }

    #[instrument(skip(self, token))]
    pub async fn list_all_subscriptions(
        &self,
        token: &str,
    ) -> Result<Vec<SubscriptionModel>, ServiceError> {
        self.tokens.validate(token).await?;
        let subscriptions = self.engine.list_all().await?;
        Ok(subscriptions.iter().map(SubscriptionModel::from_entity).collect())
    }

    #[instrument(skip(self, token))]
    pub async fn check_active_subscription(
        &self,
        token: &str,
        user_id: i64,
        service_id: i64,
    ) -> Result<bool, ServiceError> {
        self.tokens.validate(token).await?;
        self.engine.check_active(user_id, service_id).await
    }
}
