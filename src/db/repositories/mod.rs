//! Repository pattern implementations
//!
//! Data access objects for DynamoDB tables.

pub mod tenant;
pub mod usage;

pub use tenant::TenantRepository;
pub use usage::UsageRepository;
