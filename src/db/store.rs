//! Storage collaborator interfaces
//!
//! The gateway reads tenants from a [`TenantRegistry`] and appends usage to a
//! [`UsageStore`]. Keeping [`MonthlyUsageAggregate`] equal to the sum of a
//! tenant's log entries for the period is the store's job, not the caller's.

use async_trait::async_trait;

use crate::db::models::{MonthlyUsageAggregate, TenantClient, UsageLogEntry};

/// Read-only view of the tenant registry.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Look up a tenant by its external slug, regardless of active flag.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantClient>, StoreError>;
}

/// Append-only usage log with a derived monthly aggregate.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append one entry. The aggregate row for `(entry.tenant_id,
    /// entry.period)` reflects it once this returns `Ok`.
    async fn append_usage(&self, entry: &UsageLogEntry) -> Result<(), StoreError>;

    /// Current totals for a tenant and period, `None` if nothing was logged.
    async fn monthly_aggregate(
        &self,
        tenant_id: &str,
        period: &str,
    ) -> Result<Option<MonthlyUsageAggregate>, StoreError>;

    /// Connectivity probe used by the readiness endpoint.
    async fn health_check(&self) -> bool;
}

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
