//! LLM usage-metering gateway library
//!
//! Authenticates tenants, enforces monthly token and cost ceilings, forwards
//! requests to upstream LLM providers and records what each call cost.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod server;
pub mod services;

pub use config::Settings;
pub use error::GatewayError;
pub use server::App;
