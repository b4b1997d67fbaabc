//! Subscription Service - authentication tokens and subscription lifecycle.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
