//! Database module
//!
//! Storage collaborator traits, data models, and the SQLite and DynamoDB
//! backends that implement them.

pub mod dynamodb;
pub mod models;
pub mod repositories;
pub mod sqlite;
pub mod store;

pub use dynamodb::{DynamoDbClient, DynamoDbStore};
pub use models::{
    current_period_key, period_key, AuthenticatedClient, MonthlyUsageAggregate, TenantClient,
    UsageLogEntry,
};
pub use sqlite::SqliteStore;
pub use store::{StoreError, TenantRegistry, UsageStore};
