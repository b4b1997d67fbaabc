//! Service offering model.

use super::RecordStatus;
use serde::Serialize;

/// Service a user can subscribe to. Owned by the service catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOffering {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration_days: i32,
    pub status: RecordStatus,
}

impl ServiceOffering {
    pub fn new(id: i64, name: impl Into<String>, duration_days: i32) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            duration_days,
            status: RecordStatus::Active,
        }
    }
}
