//! Usage repository
//!
//! Data access layer for the usage log and the monthly aggregate tables.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::models::{MonthlyUsageAggregate, UsageLogEntry};
use crate::db::store::StoreError;
use crate::db::DynamoDbClient;

/// Repository for usage tracking operations
#[derive(Clone)]
pub struct UsageRepository {
    client: Arc<DynamoDbClient>,
}

impl UsageRepository {
    /// Create a new usage repository
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self { client }
    }

    /// Append a log entry, then fold it into the monthly aggregate.
    ///
    /// The aggregate uses an atomic `ADD`, so concurrent writers for the same
    /// tenant never lose increments. If the second write fails the log entry
    /// is already stored and the aggregate lags until reconciled.
    pub async fn append_usage(&self, entry: &UsageLogEntry) -> Result<(), StoreError> {
        let unique = Uuid::new_v4().to_string();

        self.client
            .client()
            .put_item()
            .table_name(self.client.usage_log_table())
            .set_item(Some(entry.to_dynamodb(&unique)))
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        self.increment_monthly_usage(entry).await?;

        tracing::debug!(
            tenant_id = %entry.tenant_id,
            endpoint = %entry.endpoint,
            model = %entry.model,
            total_tokens = entry.total_tokens,
            "Recorded usage"
        );

        Ok(())
    }

    /// Atomically add an entry's totals to its `(tenant_id, period)` row
    async fn increment_monthly_usage(&self, entry: &UsageLogEntry) -> Result<(), StoreError> {
        self.client
            .client()
            .update_item()
            .table_name(self.client.monthly_usage_table())
            .key("tenant_id", AttributeValue::S(entry.tenant_id.clone()))
            .key("period", AttributeValue::S(entry.period.clone()))
            .update_expression(
                "ADD total_requests :one, total_tokens :tokens, total_cost_usd :cost \
                 SET updated_at = :updated_at",
            )
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":tokens", AttributeValue::N(entry.total_tokens.to_string()))
            .expression_attribute_values(":cost", AttributeValue::N(entry.cost_usd.to_string()))
            .expression_attribute_values(":updated_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        Ok(())
    }

    /// Get the aggregate row for a tenant and period
    pub async fn monthly_aggregate(
        &self,
        tenant_id: &str,
        period: &str,
    ) -> Result<Option<MonthlyUsageAggregate>, StoreError> {
        let result = self
            .client
            .client()
            .get_item()
            .table_name(self.client.monthly_usage_table())
            .key("tenant_id", AttributeValue::S(tenant_id.to_string()))
            .key("period", AttributeValue::S(period.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        match result.item {
            Some(item) => MonthlyUsageAggregate::from_dynamodb(&item)
                .map(Some)
                .ok_or_else(|| StoreError::ParseError("Failed to parse monthly usage".to_string())),
            None => Ok(None),
        }
    }
}
