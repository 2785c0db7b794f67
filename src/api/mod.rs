//! API endpoint handlers module
//!
//! Metered proxy endpoints and unauthenticated operational endpoints.

pub mod health;
pub mod proxy;
