//! Services module for subscription-service.

pub mod database;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod reaper;
pub mod store;
pub mod subscription;
pub mod token;

pub use database::Database;
pub use error::{ErrorKind, ServiceError};
pub use gateway::SubscriptionGateway;
pub use memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_subscription_operation, record_token_operation,
};
pub use notifier::{
    LoggingNotifier, MockNotifier, SubscriptionEvent, SubscriptionEventKind, SubscriptionNotifier,
};
pub use reaper::TokenReaper;
pub use store::{IdentityStore, ServiceCatalog, SubscriptionStore, TokenStore};
pub use subscription::SubscriptionEngine;
pub use token::{strip_bearer, TokenManager};
