use serde::Deserialize;
use service_core::config::{get_env, parse_env};
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub subscription: SubscriptionPolicy,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown environment '{}'", other)),
        }
    }
}

/// Where tokens, users and subscriptions are kept.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("Unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// How long an issued token stays valid.
    pub validity_minutes: i64,
    /// Interval of the expired-token sweep; zero disables it.
    pub reaper_interval_seconds: u64,
}

/// Longest accepted token validity window (one year).
pub const MAX_TOKEN_VALIDITY_MINUTES: i64 = 365 * 24 * 60;

impl TokenConfig {
    /// Validity window as a duration, within `1..=MAX_TOKEN_VALIDITY_MINUTES`.
    pub fn validity(&self) -> Result<chrono::Duration, AppError> {
        if !(1..=MAX_TOKEN_VALIDITY_MINUTES).contains(&self.validity_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_VALIDITY_MINUTES must be between 1 and {}, got {}",
                MAX_TOKEN_VALIDITY_MINUTES,
                self.validity_minutes
            )));
        }
        chrono::Duration::try_minutes(self.validity_minutes).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("TOKEN_VALIDITY_MINUTES is out of range"))
        })
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            validity_minutes: 30,
            reaper_interval_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionPolicy {
    /// Months added to the end date by a renewal, and the default term of a
    /// new subscription created without an end date.
    pub renewal_months: u32,
    /// Upper bound on `end_date - start_date` at creation, when set.
    pub max_span_days: Option<i64>,
    /// Actor recorded in audit fields when the caller supplies none.
    pub system_actor: String,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            renewal_months: 1,
            max_span_days: None,
            system_actor: "system".to_string(),
        }
    }
}

impl SubscriptionConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let storage: StorageBackend = get_env("STORAGE_BACKEND", Some("postgres"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        // The in-memory backend never touches the database, so the URL is only
        // mandatory for postgres.
        let database_url = match storage {
            StorageBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
            StorageBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        let max_span_days = match env::var("SUBSCRIPTION_MAX_SPAN_DAYS") {
            Ok(value) if !value.trim().is_empty() => {
                Some(parse_env("SUBSCRIPTION_MAX_SPAN_DAYS", &value)?)
            }
            _ => None,
        };

        let config = SubscriptionConfig {
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("subscription-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            storage,
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_env(
                    "DATABASE_MAX_CONNECTIONS",
                    &get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                )?,
                min_connections: parse_env(
                    "DATABASE_MIN_CONNECTIONS",
                    &get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
                )?,
            },
            token: TokenConfig {
                validity_minutes: parse_env(
                    "TOKEN_VALIDITY_MINUTES",
                    &get_env("TOKEN_VALIDITY_MINUTES", Some("30"), is_prod)?,
                )?,
                reaper_interval_seconds: parse_env(
                    "TOKEN_REAPER_INTERVAL_SECONDS",
                    &get_env("TOKEN_REAPER_INTERVAL_SECONDS", Some("0"), is_prod)?,
                )?,
            },
            subscription: SubscriptionPolicy {
                renewal_months: parse_env(
                    "SUBSCRIPTION_RENEWAL_MONTHS",
                    &get_env("SUBSCRIPTION_RENEWAL_MONTHS", Some("1"), is_prod)?,
                )?,
                max_span_days,
                system_actor: get_env("SUBSCRIPTION_SYSTEM_ACTOR", Some("system"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), AppError> {
        self.token.validity()?;
        if self.subscription.renewal_months == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUBSCRIPTION_RENEWAL_MONTHS must be at least 1"
            )));
        }
        if matches!(self.subscription.max_span_days, Some(days) if days <= 0) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUBSCRIPTION_MAX_SPAN_DAYS must be positive when set"
            )));
        }
        if self.subscription.system_actor.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUBSCRIPTION_SYSTEM_ACTOR must not be empty"
            )));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS"
            )));
        }
        Ok(())
    }
}
