use serde::Serialize;
use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Stable, caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidCredential,
    AccountInactive,
    Expired,
    InvalidToken,
    UserMismatch,
    DuplicateSubscription,
    InvalidDate,
    InvalidStatus,
    InvalidArgument,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidCredential => "INVALID_CREDENTIAL",
            ErrorKind::AccountInactive => "ACCOUNT_INACTIVE",
            ErrorKind::Expired => "EXPIRED",
            ErrorKind::InvalidToken => "INVALID_TOKEN",
            ErrorKind::UserMismatch => "USER_MISMATCH",
            ErrorKind::DuplicateSubscription => "DUPLICATE_SUBSCRIPTION",
            ErrorKind::InvalidDate => "INVALID_DATE",
            ErrorKind::InvalidStatus => "INVALID_STATUS",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid password")]
    InvalidCredential,

    #[error("User account is inactive")]
    AccountInactive,

    #[error("Token is inactive or expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token does not belong to user {0}")]
    UserMismatch(i64),

    #[error("User already has an active subscription for this service")]
    DuplicateSubscription,

    #[error("{0}")]
    InvalidDate(String),

    #[error("{0}")]
    InvalidStatus(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthorized(String),

    /// Store or infrastructure failure. Only the category leaves the service;
    /// the cause is logged where it is converted.
    #[error("Internal error ({category})")]
    Internal { category: &'static str },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidCredential => ErrorKind::InvalidCredential,
            ServiceError::AccountInactive => ErrorKind::AccountInactive,
            ServiceError::Expired => ErrorKind::Expired,
            ServiceError::InvalidToken => ErrorKind::InvalidToken,
            ServiceError::UserMismatch(_) => ErrorKind::UserMismatch,
            ServiceError::DuplicateSubscription => ErrorKind::DuplicateSubscription,
            ServiceError::InvalidDate(_) => ErrorKind::InvalidDate,
            ServiceError::InvalidStatus(_) => ErrorKind::InvalidStatus,
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn user_not_found(user_id: i64) -> Self {
        ServiceError::NotFound(format!("User with ID {} not found", user_id))
    }

    pub fn subscription_not_found(subscription_id: i64) -> Self {
        ServiceError::NotFound(format!(
            "Subscription with ID '{}' not found",
            subscription_id
        ))
    }
}

impl From<AppError> for ServiceError {
    fn from(err: AppError) -> Self {
        let category = err.category();
        tracing::error!(error = %err, category, "Store operation failed");
        ServiceError::Internal { category }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = anyhow::anyhow!(err.to_string());
        match err {
            ServiceError::NotFound(_) => AppError::NotFound(message),
            ServiceError::InvalidCredential
            | ServiceError::AccountInactive
            | ServiceError::Expired
            | ServiceError::InvalidToken => AppError::Unauthorized(message),
            ServiceError::UserMismatch(_) | ServiceError::Unauthorized(_) => {
                AppError::Forbidden(message)
            }
            ServiceError::DuplicateSubscription => AppError::Conflict(message),
            ServiceError::InvalidDate(_)
            | ServiceError::InvalidStatus(_)
            | ServiceError::InvalidArgument(_) => AppError::BadRequest(message),
            ServiceError::Internal { .. } => AppError::InternalError(message),
        }
    }
}
