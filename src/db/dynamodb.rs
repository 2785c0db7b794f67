//! DynamoDB storage backend
//!
//! Wraps the AWS DynamoDB SDK client with the gateway's table names and
//! exposes the tenant registry and usage store over the repositories.

use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;
use std::sync::Arc;

use crate::config::Settings;
use crate::db::models::{MonthlyUsageAggregate, TenantClient, UsageLogEntry};
use crate::db::repositories::{TenantRepository, UsageRepository};
use crate::db::store::{StoreError, TenantRegistry, UsageStore};

/// DynamoDB client wrapper for database operations.
#[derive(Clone)]
pub struct DynamoDbClient {
    /// Application settings
    settings: Arc<Settings>,

    /// AWS DynamoDB SDK client
    client: DynamoDbSdkClient,
}

impl DynamoDbClient {
    pub fn new(settings: Arc<Settings>, client: DynamoDbSdkClient) -> Self {
        Self { settings, client }
    }

    /// Get a reference to the underlying AWS SDK client
    pub fn client(&self) -> &DynamoDbSdkClient {
        &self.client
    }

    /// Tenant registry table, partition key `slug`
    pub fn tenants_table(&self) -> &str {
        &self.settings.dynamodb_tenants_table
    }

    /// Usage log table, partition key `tenant_id`, sort key `created_key`
    pub fn usage_log_table(&self) -> &str {
        &self.settings.dynamodb_usage_log_table
    }

    /// Monthly aggregate table, partition key `tenant_id`, sort key `period`
    pub fn monthly_usage_table(&self) -> &str {
        &self.settings.dynamodb_monthly_usage_table
    }

    /// Check if the DynamoDB connection is healthy
    ///
    /// Performs a simple list_tables operation to verify connectivity.
    pub async fn health_check(&self) -> bool {
        match self.client.list_tables().limit(1).send().await {
            Ok(_) => {
                tracing::debug!("DynamoDB health check passed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "DynamoDB health check failed");
                false
            }
        }
    }
}

/// Tenant registry and usage store backed by DynamoDB tables
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Arc<DynamoDbClient>,
    tenants: TenantRepository,
    usage: UsageRepository,
}

impl DynamoDbStore {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self {
            tenants: TenantRepository::new(client.clone()),
            usage: UsageRepository::new(client.clone()),
            client,
        }
    }
}

#[async_trait]
impl TenantRegistry for DynamoDbStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantClient>, StoreError> {
        self.tenants.find_by_slug(slug).await
    }
}

#[async_trait]
impl UsageStore for DynamoDbStore {
    async fn append_usage(&self, entry: &UsageLogEntry) -> Result<(), StoreError> {
        self.usage.append_usage(entry).await
    }

    async fn monthly_aggregate(
        &self,
        tenant_id: &str,
        period: &str,
    ) -> Result<Option<MonthlyUsageAggregate>, StoreError> {
        self.usage.monthly_aggregate(tenant_id, period).await
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}
