//! Domain models for subscription-service.

mod auth_token;
mod service;
mod status;
mod subscription;
mod user;

pub use auth_token::{generate_token, redact_token, AuthToken, NewAuthToken, TokenResponse};
pub use service::ServiceOffering;
pub use status::{RecordStatus, SubscriptionStatus};
pub use subscription::{parse_date, parse_id, CreateSubscription, Subscription, SubscriptionModel};
pub use user::User;
