//! Authentication token manager.
//!
//! Issues opaque tokens against the identity store and checks them on every
//! request. At most one token per user is active; issuing a new one retires
//! the rest inside the store's atomic issuance.

use crate::config::TokenConfig;
use crate::models::{redact_token, AuthToken, NewAuthToken, TokenResponse, User};
use crate::services::error::ServiceError;
use crate::services::metrics::{record_token_operation, record_tokens_reaped};
use crate::services::store::{IdentityStore, TokenStore};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use std::future::Future;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

const BEARER_PREFIX: &str = "bearer ";

/// Remove a leading `Bearer ` scheme marker (any case) and surrounding
/// whitespace.
pub fn strip_bearer(raw: &str) -> &str {
    let trimmed = raw.trim_start();
    match trimmed.get(..BEARER_PREFIX.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => {
            trimmed[BEARER_PREFIX.len()..].trim()
        }
        _ => trimmed.trim_end(),
    }
}

fn passwords_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

fn record_outcome<T>(operation: &str, result: &Result<T, ServiceError>) {
    match result {
        Ok(_) => record_token_operation(operation, "success"),
        Err(e) => record_token_operation(operation, e.kind().as_str()),
    }
}

#[derive(Clone)]
pub struct TokenManager {
    identity: Arc<dyn IdentityStore>,
    tokens: Arc<dyn TokenStore>,
    validity: Duration,
    system_actor: String,
}

impl TokenManager {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        tokens: Arc<dyn TokenStore>,
        config: &TokenConfig,
        system_actor: impl Into<String>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            identity,
            tokens,
            validity: config.validity()?,
            system_actor: system_actor.into(),
        })
    }

    /// Check credentials and issue a fresh token, retiring any active one.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let result = self.authenticate_inner(username, password).await;
        record_outcome("authenticate", &result);
        result
    }

    async fn authenticate_inner(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let user = self
            .identity
            .find_user_by_username(username.trim())
            .await?
            .ok_or_else(|| {
                warn!("Authentication failed: unknown user");
                ServiceError::NotFound("User not found".to_string())
            })?;

        if !passwords_match(&user.password, password) {
            warn!(user_id = user.id, "Authentication failed: invalid password");
            return Err(ServiceError::InvalidCredential);
        }

        if !user.is_active() {
            warn!(user_id = user.id, "Authentication failed: account inactive");
            return Err(ServiceError::AccountInactive);
        }

        let issued = self.issue_for(&user).await?;
        info!(user_id = user.id, token = %issued.redacted(), "User authenticated");

        Ok(TokenResponse {
            token: issued.token,
        })
    }

    async fn issue_for(&self, user: &User) -> Result<AuthToken, ServiceError> {
        let new_token = NewAuthToken::for_user(user, Utc::now(), self.validity).ok_or_else(|| {
            ServiceError::from(AppError::ConfigError(anyhow::anyhow!(
                "Token expiry overflows with a validity of {}",
                self.validity
            )))
        })?;
        Ok(self.tokens.issue_token(&new_token).await?)
    }

    /// Resolve a presented token to its record and owner, applying lazy
    /// expiry.
    async fn resolve(&self, raw: &str) -> Result<(AuthToken, User), ServiceError> {
        let token = strip_bearer(raw);
        if token.is_empty() {
            return Err(ServiceError::InvalidToken);
        }

        let record = self.tokens.find_token(token).await?.ok_or_else(|| {
            warn!(token = %redact_token(token), "Unknown token presented");
            ServiceError::InvalidToken
        })?;

        if !record.status.is_active() {
            return Err(ServiceError::Expired);
        }

        if record.is_expired_at(Utc::now()) {
            self.tokens
                .expire_token(record.id, &self.system_actor)
                .await?;
            info!(user_id = record.user_id, token = %record.redacted(), "Token expired");
            return Err(ServiceError::Expired);
        }

        let user = self
            .identity
            .find_user_by_id(record.user_id)
            .await?
            .ok_or_else(|| ServiceError::user_not_found(record.user_id))?;

        if !user.is_active() {
            return Err(ServiceError::AccountInactive);
        }

        Ok((record, user))
    }

    /// True if the token is active, unexpired and owned by an active user.
    #[instrument(skip(self, token))]
    pub async fn validate(&self, token: &str) -> Result<bool, ServiceError> {
        let result = self.resolve(token).await.map(|_| true);
        record_outcome("validate", &result);
        result
    }

    /// Validate and require the token to belong to `expected_user_id`.
    #[instrument(skip(self, token))]
    pub async fn authorize(&self, token: &str, expected_user_id: i64) -> Result<i64, ServiceError> {
        self.authorize_with(token, || async move { Ok::<_, ServiceError>(expected_user_id) })
            .await
    }

    /// Validate the token, then look up the user it must belong to. The
    /// lookup runs only for a valid token, and the token is resolved once.
    pub async fn authorize_with<F, Fut>(
        &self,
        token: &str,
        expected_user: F,
    ) -> Result<i64, ServiceError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<i64, ServiceError>> + Send,
    {
        let result = self.authorize_inner(token, expected_user).await;
        record_outcome("authorize", &result);
        result
    }

    async fn authorize_inner<F, Fut>(
        &self,
        token: &str,
        expected_user: F,
    ) -> Result<i64, ServiceError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<i64, ServiceError>> + Send,
    {
        let (record, _) = self.resolve(token).await?;
        let expected_user_id = expected_user().await?;
        if record.user_id != expected_user_id {
            warn!(
                token_user = record.user_id,
                expected_user_id, "Token presented for another user"
            );
            return Err(ServiceError::UserMismatch(expected_user_id));
        }
        Ok(record.user_id)
    }

    /// Retire a token (logout).
    #[instrument(skip(self, token))]
    pub async fn invalidate(&self, token: &str) -> Result<(), ServiceError> {
        let result = self.invalidate_inner(token).await;
        record_outcome("invalidate", &result);
        result
    }

    async fn invalidate_inner(&self, token: &str) -> Result<(), ServiceError> {
        let (record, user) = self.resolve(token).await?;
        if !self.tokens.expire_token(record.id, &user.username).await? {
            return Err(ServiceError::Expired);
        }
        info!(user_id = user.id, token = %record.redacted(), "Token invalidated");
        Ok(())
    }

    /// Exchange a valid token for a new one. The presented token is retired.
    #[instrument(skip(self, token))]
    pub async fn refresh(&self, token: &str) -> Result<TokenResponse, ServiceError> {
        let result = self.refresh_inner(token).await;
        record_outcome("refresh", &result);
        result
    }

    async fn refresh_inner(&self, token: &str) -> Result<TokenResponse, ServiceError> {
        let (_, user) = self.resolve(token).await?;
        let issued = self.issue_for(&user).await?;
        info!(user_id = user.id, token = %issued.redacted(), "Token refreshed");
        Ok(TokenResponse {
            token: issued.token,
        })
    }

    /// Deactivate every active token past its expiry.
    #[instrument(skip(self))]
    pub async fn reap_expired(&self) -> Result<u64, ServiceError> {
        let count = self
            .tokens
            .expire_tokens_before(Utc::now(), &self.system_actor)
            .await?;
        if count > 0 {
            info!(count, "Expired tokens deactivated");
        }
        record_tokens_reaped("sweep", count);
        Ok(count)
    }
}
