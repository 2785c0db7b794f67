//! Storage data models
//!
//! Tenant, usage-log and monthly-aggregate records shared by every storage
//! backend, plus their DynamoDB item conversions.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Aggregation key for a UTC calendar month, formatted `YYYY-MM`.
pub fn period_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Period key for the current UTC calendar month.
pub fn current_period_key() -> String {
    period_key(Utc::now())
}

/// A registered tenant application.
///
/// Owned by the tenant registry; the gateway only reads it. The secret is
/// never serialized and is redacted from `Debug` output.
#[derive(Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct TenantClient {
    /// Internal identifier
    pub id: String,

    /// External identifier sent by callers, unique across tenants
    pub slug: String,

    /// Shared secret issued to the tenant
    #[serde(skip_serializing)]
    pub secret: String,

    pub active: bool,

    pub monthly_token_limit: i64,

    pub monthly_cost_limit_usd: f64,

    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for TenantClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantClient")
            .field("id", &self.id)
            .field("slug", &self.slug)
            .field("secret", &"<redacted>")
            .field("active", &self.active)
            .field("monthly_token_limit", &self.monthly_token_limit)
            .field("monthly_cost_limit_usd", &self.monthly_cost_limit_usd)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl TenantClient {
    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &HashMap<String, AttributeValue>) -> Option<Self> {
        Some(Self {
            id: get_string(item, "id")?,
            slug: get_string(item, "slug")?,
            secret: get_string(item, "secret")?,
            active: get_bool(item, "active").unwrap_or(false),
            monthly_token_limit: get_number(item, "monthly_token_limit").unwrap_or(0),
            monthly_cost_limit_usd: get_number_f64(item, "monthly_cost_limit_usd").unwrap_or(0.0),
            created_at: get_string(item, "created_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
        })
    }
}

/// Authenticated tenant as seen by the rest of the request pipeline.
///
/// A projection of [`TenantClient`] that never carries the secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthenticatedClient {
    pub id: String,
    pub slug: String,
    pub monthly_token_limit: i64,
    pub monthly_cost_limit_usd: f64,
}

impl From<&TenantClient> for AuthenticatedClient {
    fn from(tenant: &TenantClient) -> Self {
        Self {
            id: tenant.id.clone(),
            slug: tenant.slug.clone(),
            monthly_token_limit: tenant.monthly_token_limit,
            monthly_cost_limit_usd: tenant.monthly_cost_limit_usd,
        }
    }
}

/// One metered upstream call. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageLogEntry {
    pub tenant_id: String,

    /// Which gateway route produced the entry, e.g. `openai.chat_completions`
    pub endpoint: String,

    pub provider: String,

    pub model: String,

    pub input_tokens: i64,

    pub output_tokens: i64,

    pub total_tokens: i64,

    pub cost_usd: f64,

    /// Free-form JSON object (tenant slug, request id, upstream status)
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// `YYYY-MM` period this entry accumulates into
    pub period: String,
}

impl UsageLogEntry {
    /// Sort key for the DynamoDB usage log: timestamp plus a unique suffix so
    /// concurrent entries for one tenant never overwrite each other.
    pub fn sort_key(&self, unique: &str) -> String {
        format!("{}#{}", self.created_at.to_rfc3339(), unique)
    }

    /// Convert to DynamoDB item
    pub fn to_dynamodb(&self, unique: &str) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert("tenant_id".to_string(), AttributeValue::S(self.tenant_id.clone()));
        item.insert("created_key".to_string(), AttributeValue::S(self.sort_key(unique)));
        item.insert("endpoint".to_string(), AttributeValue::S(self.endpoint.clone()));
        item.insert("provider".to_string(), AttributeValue::S(self.provider.clone()));
        item.insert("model".to_string(), AttributeValue::S(self.model.clone()));
        item.insert("input_tokens".to_string(), AttributeValue::N(self.input_tokens.to_string()));
        item.insert("output_tokens".to_string(), AttributeValue::N(self.output_tokens.to_string()));
        item.insert("total_tokens".to_string(), AttributeValue::N(self.total_tokens.to_string()));
        item.insert("cost_usd".to_string(), AttributeValue::N(self.cost_usd.to_string()));
        item.insert("metadata".to_string(), AttributeValue::S(self.metadata.to_string()));
        item.insert("created_at".to_string(), AttributeValue::S(self.created_at.to_rfc3339()));
        item.insert("period".to_string(), AttributeValue::S(self.period.clone()));
        item
    }
}

/// Running totals for one tenant in one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct MonthlyUsageAggregate {
    pub tenant_id: String,
    pub period: String,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
}

impl MonthlyUsageAggregate {
    /// Parse from DynamoDB item
    pub fn from_dynamodb(item: &HashMap<String, AttributeValue>) -> Option<Self> {
        Some(Self {
            tenant_id: get_string(item, "tenant_id")?,
            period: get_string(item, "period")?,
            total_requests: get_number(item, "total_requests").unwrap_or(0),
            total_tokens: get_number(item, "total_tokens").unwrap_or(0),
            total_cost_usd: get_number_f64(item, "total_cost_usd").unwrap_or(0.0),
        })
    }
}

// Helper functions for parsing DynamoDB AttributeValues

fn get_string(item: &HashMap<String, AttributeValue>, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).map(|s| s.to_string())
}

fn get_number(item: &HashMap<String, AttributeValue>, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn get_number_f64(item: &HashMap<String, AttributeValue>, key: &str) -> Option<f64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn get_bool(item: &HashMap<String, AttributeValue>, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}
