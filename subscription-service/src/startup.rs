//! Application startup and lifecycle management.
//!
//! Wires the configured store into the token manager, the lifecycle engine
//! and the gateway, and runs the optional token reaper until shutdown.

use crate::config::{StorageBackend, SubscriptionConfig};
use crate::services::{
    Database, IdentityStore, InMemoryStore, LoggingNotifier, ServiceCatalog, SubscriptionEngine,
    SubscriptionGateway, SubscriptionNotifier, SubscriptionStore, TokenManager, TokenReaper,
    TokenStore,
};
use service_core::error::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Build the gateway over a single store that implements every seam.
pub fn build_gateway<S>(
    store: Arc<S>,
    notifier: Arc<dyn SubscriptionNotifier>,
    config: &SubscriptionConfig,
) -> Result<SubscriptionGateway, AppError>
where
    S: IdentityStore + TokenStore + SubscriptionStore + ServiceCatalog + 'static,
{
    let tokens = TokenManager::new(
        store.clone(),
        store.clone(),
        &config.token,
        config.subscription.system_actor.clone(),
    )?;
    let engine = SubscriptionEngine::new(
        store.clone(),
        store.clone(),
        store,
        notifier,
        config.subscription.clone(),
    );
    Ok(SubscriptionGateway::new(tokens, engine))
}

/// Application container for managing the service lifecycle.
pub struct Application {
    config: SubscriptionConfig,
    gateway: SubscriptionGateway,
    database: Option<Database>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SubscriptionConfig) -> Result<Self, AppError> {
        let notifier: Arc<dyn SubscriptionNotifier> = Arc::new(LoggingNotifier);

        match config.storage {
            StorageBackend::Postgres => {
                let db = Database::new(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;

                db.run_migrations().await.map_err(|e| {
                    tracing::error!("Failed to run database migrations: {}", e);
                    e
                })?;

                let gateway = build_gateway(Arc::new(db.clone()), notifier, &config)?;
                tracing::info!("Subscription service using PostgreSQL storage");
                Ok(Self {
                    config,
                    gateway,
                    database: Some(db),
                })
            }
            StorageBackend::Memory => {
                tracing::warn!("Subscription service using in-memory storage; data is not persisted");
                Self::with_memory_store(config, Arc::new(InMemoryStore::new()), notifier)
            }
        }
    }

    /// Build over an existing in-memory store.
    pub fn with_memory_store(
        config: SubscriptionConfig,
        store: Arc<InMemoryStore>,
        notifier: Arc<dyn SubscriptionNotifier>,
    ) -> Result<Self, AppError> {
        let gateway = build_gateway(store, notifier, &config)?;
        Ok(Self {
            config,
            gateway,
            database: None,
        })
    }

    pub fn gateway(&self) -> &SubscriptionGateway {
        &self.gateway
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Get a reference to the database, if the postgres backend is in use.
    pub fn db(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        match &self.database {
            Some(db) => db.health_check().await,
            None => Ok(()),
        }
    }

    /// Run background work until `shutdown` resolves.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let reaper = match self.config.token.reaper_interval_seconds {
            0 => {
                tracing::info!("Token reaper disabled by configuration");
                None
            }
            seconds => {
                let reaper = TokenReaper::new(
                    self.gateway.tokens().clone(),
                    Duration::from_secs(seconds),
                );
                let stop = reaper.shutdown_token();
                Some((stop, reaper.start()))
            }
        };

        tracing::info!(
            service = %self.config.service_name,
            storage = ?self.config.storage,
            "Subscription service ready"
        );

        shutdown.await;

        if let Some((stop, handle)) = reaper {
            stop.cancel();
            if let Err(e) = handle.await {
                tracing::error!("Token reaper task failed: {}", e);
            }
        }

        if let Some(db) = &self.database {
            db.pool().close().await;
        }

        tracing::info!("Subscription service stopped");
        Ok(())
    }
}
