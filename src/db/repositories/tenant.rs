//! Tenant repository
//!
//! Read-only access to the tenant registry table.

use aws_sdk_dynamodb::types::AttributeValue;
use std::sync::Arc;

use crate::db::models::TenantClient;
use crate::db::store::StoreError;
use crate::db::DynamoDbClient;

/// Repository for tenant lookups
#[derive(Clone)]
pub struct TenantRepository {
    client: Arc<DynamoDbClient>,
}

impl TenantRepository {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self { client }
    }

    /// Fetch a tenant by slug without checking its active flag
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantClient>, StoreError> {
        let result = self
            .client
            .client()
            .get_item()
            .table_name(self.client.tenants_table())
            .key("slug", AttributeValue::S(slug.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::DynamoDb(e.to_string()))?;

        let Some(item) = result.item else {
            return Ok(None);
        };

        match TenantClient::from_dynamodb(&item) {
            Some(tenant) => Ok(Some(tenant)),
            None => Err(StoreError::ParseError("Failed to parse tenant client".to_string())),
        }
    }
}
