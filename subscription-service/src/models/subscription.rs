//! Subscription model and its wire representation.

use super::{RecordStatus, SubscriptionStatus};
use crate::services::ServiceError;
use crate::utils::{format_compact_date, parse_compact_date};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub service_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: SubscriptionStatus,
    pub created_by: String,
    pub updated_by: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn record_status(&self) -> RecordStatus {
        self.status.record_status()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Input for creating a subscription. The store assigns the id.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: i64,
    pub service_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: SubscriptionStatus,
    pub actor: String,
    pub created_utc: DateTime<Utc>,
}

/// Wire model. Every field is optional so the same shape carries partial
/// updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// `yyyyMMdd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// `yyyyMMdd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbstatus: Option<RecordStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl SubscriptionModel {
    /// Convenience constructor for a create request.
    pub fn new_request(
        user_id: i64,
        service_id: i64,
        start_date: NaiveDate,
        status: SubscriptionStatus,
    ) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            service_id: Some(service_id.to_string()),
            start_date: Some(format_compact_date(start_date)),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Status asked for by the caller: the rich `status` wins, the coarse
    /// `dbstatus` is the fallback.
    pub fn requested_status(&self) -> Option<SubscriptionStatus> {
        self.status
            .or_else(|| self.dbstatus.map(SubscriptionStatus::from))
    }

    pub fn parsed_user_id(&self) -> Result<Option<i64>, ServiceError> {
        self.user_id
            .as_deref()
            .map(|v| parse_id("userId", v))
            .transpose()
    }

    pub fn parsed_service_id(&self) -> Result<Option<i64>, ServiceError> {
        self.service_id
            .as_deref()
            .map(|v| parse_id("serviceId", v))
            .transpose()
    }

    pub fn parsed_start_date(&self) -> Result<Option<NaiveDate>, ServiceError> {
        self.start_date
            .as_deref()
            .map(|v| parse_date("startDate", v))
            .transpose()
    }

    pub fn parsed_end_date(&self) -> Result<Option<NaiveDate>, ServiceError> {
        self.end_date
            .as_deref()
            .map(|v| parse_date("endDate", v))
            .transpose()
    }

    /// Map an entity to its wire form.
    pub fn from_entity(entity: &Subscription) -> Self {
        Self {
            id: Some(entity.id.to_string()),
            user_id: Some(entity.user_id.to_string()),
            service_id: Some(entity.service_id.to_string()),
            start_date: Some(format_compact_date(entity.start_date)),
            end_date: Some(format_compact_date(entity.end_date)),
            status: Some(entity.status),
            dbstatus: Some(entity.record_status()),
            created_date: Some(entity.created_utc.to_rfc3339()),
            updated_date: Some(entity.updated_utc.to_rfc3339()),
            created_by: Some(entity.created_by.clone()),
            updated_by: Some(entity.updated_by.clone()),
        }
    }

    /// Map a complete wire model back to an entity. Missing audit fields
    /// default to `system_actor` and the current time.
    pub fn to_entity(&self, system_actor: &str) -> Result<Subscription, ServiceError> {
        let id = required(&self.id, "id").and_then(|v| parse_id("id", v))?;
        let user_id = required(&self.user_id, "userId").and_then(|v| parse_id("userId", v))?;
        let service_id =
            required(&self.service_id, "serviceId").and_then(|v| parse_id("serviceId", v))?;
        let start_date = self
            .parsed_start_date()?
            .ok_or_else(|| ServiceError::InvalidDate("startDate is required".to_string()))?;
        let end_date = self
            .parsed_end_date()?
            .ok_or_else(|| ServiceError::InvalidDate("endDate is required".to_string()))?;
        let status = self
            .requested_status()
            .ok_or_else(|| ServiceError::InvalidStatus("status is required".to_string()))?;

        let now = Utc::now();
        let created_utc = parse_timestamp("createdDate", self.created_date.as_deref())?.unwrap_or(now);
        let updated_utc = parse_timestamp("updatedDate", self.updated_date.as_deref())?.unwrap_or(now);
        let created_by = self
            .created_by
            .clone()
            .unwrap_or_else(|| system_actor.to_string());
        let updated_by = self.updated_by.clone().unwrap_or_else(|| created_by.clone());

        Ok(Subscription {
            id,
            user_id,
            service_id,
            start_date,
            end_date,
            status,
            created_by,
            updated_by,
            created_utc,
            updated_utc,
        })
    }
}

impl From<&Subscription> for SubscriptionModel {
    fn from(entity: &Subscription) -> Self {
        SubscriptionModel::from_entity(entity)
    }
}

/// Parse a positive integer identifier.
pub fn parse_id(field: &str, value: &str) -> Result<i64, ServiceError> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ServiceError::InvalidArgument(format!(
            "{} must be a positive integer, got '{}'",
            field, value
        ))),
    }
}

/// Parse a `yyyyMMdd` date field.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ServiceError> {
    parse_compact_date(value).ok_or_else(|| {
        ServiceError::InvalidDate(format!(
            "{} must be a date in yyyyMMdd format, got '{}'",
            field, value
        ))
    })
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, ServiceError> {
    value
        .as_deref()
        .ok_or_else(|| ServiceError::InvalidArgument(format!("{} is required", field)))
}

fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ServiceError> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    ServiceError::InvalidArgument(format!("{} must be an RFC 3339 timestamp", field))
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ErrorKind;

    fn entity(status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 42,
            user_id: 1,
            service_id: 5,
            start_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 2, 15).unwrap(),
            status,
            created_by: "alice".to_string(),
            updated_by: "system".to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn test_entity_to_model_and_back() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Suspended,
        ] {
            let original = entity(status);
            let model = SubscriptionModel::from_entity(&original);
            assert_eq!(model.start_date.as_deref(), Some("20300115"));
            assert_eq!(model.dbstatus, Some(status.record_status()));

            let back = model.to_entity("system").unwrap();
            assert_eq!(back.id, original.id);
            assert_eq!(back.user_id, original.user_id);
            assert_eq!(back.service_id, original.service_id);
            assert_eq!(back.status, original.status);
            assert_eq!(back.end_date, original.end_date);
        }
    }

    #[test]
    fn test_model_to_entity_and_back() {
        let model = SubscriptionModel {
            id: Some("9".to_string()),
            user_id: Some("3".to_string()),
            service_id: Some("4".to_string()),
            start_date: Some("20300101".to_string()),
            end_date: Some("20300201".to_string()),
            dbstatus: Some(RecordStatus::Inactive),
            ..Default::default()
        };
        let again = SubscriptionModel::from_entity(&model.to_entity("system").unwrap());
        assert_eq!(again.id, model.id);
        assert_eq!(again.user_id, model.user_id);
        assert_eq!(again.service_id, model.service_id);
        assert_eq!(again.status, Some(SubscriptionStatus::Inactive));
        assert_eq!(again.created_by.as_deref(), Some("system"));
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(SubscriptionModel::from_entity(&entity(
            SubscriptionStatus::Active,
        )))
        .unwrap();
        assert_eq!(json["userId"], "1");
        assert_eq!(json["serviceId"], "5");
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["dbstatus"], "ACTIVE");
        assert!(json.get("createdDate").is_some());

        let parsed: SubscriptionModel =
            serde_json::from_str(r#"{"userId":"1","dbstatus":"inactive"}"#).unwrap();
        assert_eq!(parsed.requested_status(), Some(SubscriptionStatus::Inactive));
        assert!(parsed.start_date.is_none());
    }

    #[test]
    fn test_rich_status_wins_over_dbstatus() {
        let model = SubscriptionModel {
            status: Some(SubscriptionStatus::Suspended),
            dbstatus: Some(RecordStatus::Active),
            ..Default::default()
        };
        assert_eq!(model.requested_status(), Some(SubscriptionStatus::Suspended));
    }

    #[test]
    fn test_id_and_date_parsing() {
        assert_eq!(parse_id("userId", "17").unwrap(), 17);
        assert_eq!(parse_id("userId", "0").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(parse_id("userId", "-3").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(parse_id("userId", "abc").unwrap_err().kind(), ErrorKind::InvalidArgument);

        assert!(parse_date("startDate", "20300101").is_ok());
        assert_eq!(
            parse_date("startDate", "2030-01-01").unwrap_err().kind(),
            ErrorKind::InvalidDate
        );
    }

    #[test]
    fn test_incomplete_model_does_not_map() {
        let model = SubscriptionModel::new_request(
            1,
            5,
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            SubscriptionStatus::Active,
        );
        assert_eq!(
            model.to_entity("system").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
