//! Authentication token model.

use super::{RecordStatus, User};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Issued token. Rows are never deleted; they only turn inactive.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub status: RecordStatus,
    pub created_by: String,
    pub updated_by: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl AuthToken {
    /// Check if this token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_utc
    }

    /// Short prefix safe to put in logs.
    pub fn redacted(&self) -> String {
        redact_token(&self.token)
    }
}

/// Input for persisting a freshly issued token.
#[derive(Debug, Clone)]
pub struct NewAuthToken {
    pub token: String,
    pub user_id: i64,
    pub issued_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub actor: String,
}

impl NewAuthToken {
    /// Build a token for `user` valid for `validity` from `now`. `None` if
    /// the expiry is not representable.
    pub fn for_user(user: &User, now: DateTime<Utc>, validity: Duration) -> Option<Self> {
        Some(Self {
            token: generate_token(),
            user_id: user.id,
            issued_utc: now,
            expiry_utc: now.checked_add_signed(validity)?,
            actor: user.username.clone(),
        })
    }
}

/// Token handed back to the caller after authentication.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
}

/// Generate a globally unique opaque token.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}…", prefix)
}
