//! Database service for subscription-service.

use crate::models::{
    AuthToken, CreateSubscription, NewAuthToken, RecordStatus, ServiceOffering, Subscription,
    SubscriptionStatus, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{IdentityStore, ServiceCatalog, SubscriptionStore, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument, warn};

const TOKEN_COLUMNS: &str = "token_id, token, user_id, issued_utc, expiry_utc, status, created_by, updated_by, created_utc, updated_utc";
const SUBSCRIPTION_COLUMNS: &str = "subscription_id, user_id, service_id, start_date, end_date, status, created_by, updated_by, created_utc, updated_utc";

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: i64,
    username: String,
    password: String,
    status: String,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.user_id,
            username: row.username,
            password: row.password,
            status: RecordStatus::from_string(&row.status),
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct ServiceRow {
    service_id: i64,
    name: String,
    description: Option<String>,
    duration_days: i32,
    status: String,
}

impl From<ServiceRow> for ServiceOffering {
    fn from(row: ServiceRow) -> Self {
        ServiceOffering {
            id: row.service_id,
            name: row.name,
            description: row.description.unwrap_or_default(),
            duration_days: row.duration_days,
            status: RecordStatus::from_string(&row.status),
        }
    }
}

#[derive(Debug, FromRow)]
struct TokenRow {
    token_id: i64,
    token: String,
    user_id: i64,
    issued_utc: DateTime<Utc>,
    expiry_utc: DateTime<Utc>,
    status: String,
    created_by: String,
    updated_by: String,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<TokenRow> for AuthToken {
    fn from(row: TokenRow) -> Self {
        AuthToken {
            id: row.token_id,
            token: row.token,
            user_id: row.user_id,
            issued_utc: row.issued_utc,
            expiry_utc: row.expiry_utc,
            status: RecordStatus::from_string(&row.status),
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    subscription_id: i64,
    user_id: i64,
    service_id: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    created_by: String,
    updated_by: String,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            id: row.subscription_id,
            user_id: row.user_id,
            service_id: row.service_id,
            start_date: row.start_date,
            end_date: row.end_date,
            status: SubscriptionStatus::from_string(&row.status),
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

/// Map a write failure, turning unique violations into `Conflict`.
fn write_error(e: sqlx::Error, context: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("{}: unique constraint violated", context))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e)),
    }
}

fn read_error(e: sqlx::Error, context: &str) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "subscription-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Reference data (users and services are owned elsewhere; these exist for
    // seeding and tests)
    // =========================================================================

    #[instrument(skip(self, password))]
    pub async fn insert_user(
        &self,
        username: &str,
        password: &str,
        status: RecordStatus,
    ) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password, status)
            VALUES ($1, $2, $3)
            RETURNING user_id, username, password, status, created_utc, updated_utc
            "#,
        )
        .bind(username)
        .bind(password)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to insert user"))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn insert_service(
        &self,
        name: &str,
        description: &str,
        duration_days: i32,
    ) -> Result<ServiceOffering, AppError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            INSERT INTO services (name, description, duration_days)
            VALUES ($1, $2, $3)
            RETURNING service_id, name, description, duration_days, status
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(duration_days)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to insert service"))?;

        Ok(row.into())
    }
}

#[async_trait]
impl IdentityStore for Database {
    #[instrument(skip(self))]
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_by_username"])
            .start_timer();

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password, status, created_utc, updated_utc
            FROM users
            WHERE lower(username) = lower($1)
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to get user"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_by_id"])
            .start_timer();

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, username, password, status, created_utc, updated_utc
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to get user"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl ServiceCatalog for Database {
    #[instrument(skip(self))]
    async fn find_service(&self, service_id: i64) -> Result<Option<ServiceOffering>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_service"])
            .start_timer();

        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT service_id, name, description, duration_days, status
            FROM services
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to get service"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl TokenStore for Database {
    /// Runs deactivate-all and insert in one transaction. The advisory lock
    /// serialises issuance per user; the partial unique index on active tokens
    /// backs it up.
    #[instrument(skip(self, token), fields(user_id = token.user_id))]
    async fn issue_token(&self, token: &NewAuthToken) -> Result<AuthToken, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["issue_token"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(token.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| read_error(e, "Failed to lock user tokens"))?;

        let deactivated = sqlx::query(
            r#"
            UPDATE auth_tokens
            SET status = 'inactive', updated_by = $2, updated_utc = $3
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(token.user_id)
        .bind(&token.actor)
        .bind(token.issued_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Failed to deactivate tokens"))?
        .rows_affected();

        let row = sqlx::query_as::<_, TokenRow>(&format!(
            r#"
            INSERT INTO auth_tokens (token, user_id, issued_utc, expiry_utc, status, created_by, updated_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, 'active', $5, $5, $3, $3)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        ))
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.issued_utc)
        .bind(token.expiry_utc)
        .bind(&token.actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Failed to insert token"))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            token_id = row.token_id,
            deactivated = deactivated,
            "Token issued"
        );

        Ok(row.into())
    }

    #[instrument(skip(self, token))]
    async fn find_token(&self, token: &str) -> Result<Option<AuthToken>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_token"])
            .start_timer();

        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM auth_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to get token"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_active_tokens(&self, user_id: i64) -> Result<Vec<AuthToken>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_active_tokens"])
            .start_timer();

        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM auth_tokens WHERE user_id = $1 AND status = 'active' ORDER BY token_id",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to list tokens"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn expire_token(&self, token_id: i64, actor: &str) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expire_token"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE auth_tokens
            SET status = 'inactive', updated_by = $2, updated_utc = NOW()
            WHERE token_id = $1 AND status = 'active'
            "#,
        )
        .bind(token_id)
        .bind(actor)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to expire token"))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn expire_tokens_before(
        &self,
        now: DateTime<Utc>,
        actor: &str,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expire_tokens_before"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE auth_tokens
            SET status = 'inactive', updated_by = $2, updated_utc = $1
            WHERE status = 'active' AND expiry_utc < $1
            "#,
        )
        .bind(now)
        .bind(actor)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to expire tokens"))?;

        timer.observe_duration();
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SubscriptionStore for Database {
    #[instrument(skip(self, input), fields(user_id = input.user_id, service_id = input.service_id))]
    async fn insert_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            INSERT INTO subscriptions (user_id, service_id, start_date, end_date, status, created_by, updated_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $7)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(input.user_id)
        .bind(input.service_id)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.status.as_str())
        .bind(&input.actor)
        .bind(input.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = write_error(e, "Failed to create subscription");
            if matches!(err, AppError::Conflict(_)) {
                warn!("Active subscription already exists");
            }
            err
        })?;

        timer.observe_duration();
        info!(subscription_id = row.subscription_id, "Subscription created");

        Ok(row.into())
    }

    #[instrument(skip(self, subscription, expected), fields(subscription_id = subscription.id))]
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected: &Subscription,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            UPDATE subscriptions
            SET user_id = $2, service_id = $3, start_date = $4, end_date = $5, status = $6,
                updated_by = $7, updated_utc = $8
            WHERE subscription_id = $1 AND status = $9 AND updated_utc = $10
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.service_id)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.status.as_str())
        .bind(&subscription.updated_by)
        .bind(subscription.updated_utc)
        .bind(expected.status.as_str())
        .bind(expected.updated_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to update subscription"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_subscription(&self, id: i64) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_subscription"])
            .start_timer();

        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to get subscription"))?;

        timer.observe_duration();
        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_subscriptions_by_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_subscriptions_by_user"])
            .start_timer();

        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY subscription_id",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to list subscriptions"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_subscriptions_by_user_and_status(
        &self,
        user_id: i64,
        status: RecordStatus,
    ) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_subscriptions_by_user_and_status"])
            .start_timer();

        // Only 'active' projects to the active record status.
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE user_id = $1 AND (status = 'active') = $2
            ORDER BY subscription_id
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(status.is_active())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to list subscriptions by status"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn subscription_exists(
        &self,
        user_id: i64,
        service_id: i64,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["subscription_exists"])
            .start_timer();

        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM subscriptions
                WHERE user_id = $1 AND service_id = $2 AND status = $3
            )
            "#,
        )
        .bind(user_id)
        .bind(service_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to check subscription"))?;

        timer.observe_duration();
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions ORDER BY subscription_id",
            SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "Failed to list subscriptions"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
