//! Status vocabularies.
//!
//! Records (users, tokens, services) carry the coarse [`RecordStatus`].
//! Subscriptions carry the richer [`SubscriptionStatus`]; its coarse view is
//! a projection where only `Active` maps to `Active`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse record-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Inactive => "inactive",
        }
    }

    /// Storage value to status. Unknown values are treated as inactive so a
    /// corrupt row can never grant access.
    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(RecordStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RecordStatus::Active)
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(RecordStatus::Active),
            "inactive" => Ok(RecordStatus::Inactive),
            other => Err(format!("Unknown record status '{}'", other)),
        }
    }
}

impl TryFrom<String> for RecordStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Cancelled,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Suspended => "suspended",
        }
    }

    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(SubscriptionStatus::Inactive)
    }

    /// Coarse projection used by the `dbstatus` wire field.
    pub fn record_status(&self) -> RecordStatus {
        match self {
            SubscriptionStatus::Active => RecordStatus::Active,
            SubscriptionStatus::Inactive
            | SubscriptionStatus::Cancelled
            | SubscriptionStatus::Suspended => RecordStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }

    /// Transitions allowed through a plain update. A cancelled subscription
    /// only comes back through renewal.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        !(self.is_terminal() && next.is_active())
    }
}

impl From<RecordStatus> for SubscriptionStatus {
    fn from(status: RecordStatus) -> Self {
        match status {
            RecordStatus::Active => SubscriptionStatus::Active,
            RecordStatus::Inactive => SubscriptionStatus::Inactive,
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            other => Err(format!("Unknown subscription status '{}'", other)),
        }
    }
}

impl TryFrom<String> for SubscriptionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
