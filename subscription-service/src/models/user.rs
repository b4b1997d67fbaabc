//! User record as held by the identity store.

use super::RecordStatus;
use chrono::{DateTime, Utc};
use std::fmt;

/// User account. Read-only to this service.
#[derive(Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Opaque credential compared verbatim.
    pub password: String,
    pub status: RecordStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, password: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            password: password.into(),
            status: RecordStatus::Active,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("status", &self.status)
            .finish()
    }
}
