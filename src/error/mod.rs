//! Error types returned by the gateway's HTTP surface

pub mod types;

pub use types::{ErrorBody, GatewayError};
