//! SQLite storage backend
//!
//! Tenants, the usage log and the monthly aggregate live in one database.
//! An `AFTER INSERT` trigger on `usage_logs` upserts the matching
//! `monthly_usage` row, so the aggregate is updated in the same statement
//! that appends the log entry.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use std::str::FromStr;

use crate::db::models::{MonthlyUsageAggregate, TenantClient, UsageLogEntry};
use crate::db::store::{StoreError, TenantRegistry, UsageStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenant_clients (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    secret TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    monthly_token_limit INTEGER NOT NULL,
    monthly_cost_limit_usd REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS usage_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id TEXT NOT NULL REFERENCES tenant_clients(id),
    endpoint TEXT NOT NULL,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL,
    cost_usd REAL NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    period TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_logs_tenant_period ON usage_logs (tenant_id, period);

CREATE TABLE IF NOT EXISTS monthly_usage (
    tenant_id TEXT NOT NULL,
    period TEXT NOT NULL,
    total_requests INTEGER NOT NULL DEFAULT 0,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost_usd REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, period)
);

CREATE TRIGGER IF NOT EXISTS trg_usage_logs_monthly_usage
AFTER INSERT ON usage_logs
BEGIN
    INSERT INTO monthly_usage (tenant_id, period, total_requests, total_tokens, total_cost_usd)
    VALUES (NEW.tenant_id, NEW.period, 1, NEW.total_tokens, NEW.cost_usd)
    ON CONFLICT (tenant_id, period) DO UPDATE SET
        total_requests = total_requests + 1,
        total_tokens = total_tokens + excluded.total_tokens,
        total_cost_usd = total_cost_usd + excluded.total_cost_usd;
END;
"#;

/// SQLite-backed tenant registry and usage store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::debug!(database_url = %database_url, "Connected to SQLite store");

        Ok(Self { pool })
    }

    /// Create tables and the aggregate trigger if they do not exist yet
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("SQLite schema is up to date");
        Ok(())
    }

    /// Insert or replace a tenant.
    ///
    /// Tenant administration belongs to a separate surface; this exists for
    /// seeding local databases and tests.
    pub async fn upsert_tenant(&self, tenant: &TenantClient) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenant_clients \
             (id, slug, secret, active, monthly_token_limit, monthly_cost_limit_usd, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
             slug = excluded.slug, secret = excluded.secret, active = excluded.active, \
             monthly_token_limit = excluded.monthly_token_limit, \
             monthly_cost_limit_usd = excluded.monthly_cost_limit_usd",
        )
        .bind(&tenant.id)
        .bind(&tenant.slug)
        .bind(&tenant.secret)
        .bind(tenant.active)
        .bind(tenant.monthly_token_limit)
        .bind(tenant.monthly_cost_limit_usd)
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All log entries for a tenant, oldest first
    pub async fn usage_entries(&self, tenant_id: &str) -> Result<Vec<UsageLogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT tenant_id, endpoint, provider, model, input_tokens, output_tokens, \
             total_tokens, cost_usd, metadata, created_at, period \
             FROM usage_logs WHERE tenant_id = ? ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<UsageLogEntry, StoreError> {
                let metadata: Json<serde_json::Value> = row.try_get("metadata")?;
                Ok(UsageLogEntry {
                    tenant_id: row.try_get("tenant_id")?,
                    endpoint: row.try_get("endpoint")?,
                    provider: row.try_get("provider")?,
                    model: row.try_get("model")?,
                    input_tokens: row.try_get("input_tokens")?,
                    output_tokens: row.try_get("output_tokens")?,
                    total_tokens: row.try_get("total_tokens")?,
                    cost_usd: row.try_get("cost_usd")?,
                    metadata: metadata.0,
                    created_at: row.try_get("created_at")?,
                    period: row.try_get("period")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl TenantRegistry for SqliteStore {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantClient>, StoreError> {
        let tenant = sqlx::query_as::<_, TenantClient>(
            "SELECT id, slug, secret, active, monthly_token_limit, monthly_cost_limit_usd, created_at \
             FROM tenant_clients WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn append_usage(&self, entry: &UsageLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO usage_logs \
             (tenant_id, endpoint, provider, model, input_tokens, output_tokens, total_tokens, \
              cost_usd, metadata, created_at, period) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.endpoint)
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(entry.total_tokens)
        .bind(entry.cost_usd)
        .bind(Json(&entry.metadata))
        .bind(entry.created_at)
        .bind(&entry.period)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            tenant_id = %entry.tenant_id,
            endpoint = %entry.endpoint,
            model = %entry.model,
            total_tokens = entry.total_tokens,
            "Recorded usage"
        );

        Ok(())
    }

    async fn monthly_aggregate(
        &self,
        tenant_id: &str,
        period: &str,
    ) -> Result<Option<MonthlyUsageAggregate>, StoreError> {
        let aggregate = sqlx::query_as::<_, MonthlyUsageAggregate>(
            "SELECT tenant_id, period, total_requests, total_tokens, total_cost_usd \
             FROM monthly_usage WHERE tenant_id = ? AND period = ?",
        )
        .bind(tenant_id)
        .bind(period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(aggregate)
    }

    async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "SQLite health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn store() -> (SqliteStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("gateway.db").display());
        let store = SqliteStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        (store, dir)
    }

    fn tenant(id: &str, slug: &str) -> TenantClient {
        TenantClient {
            id: id.to_string(),
            slug: slug.to_string(),
            secret: "s3cret".to_string(),
            active: true,
            monthly_token_limit: 1000,
            monthly_cost_limit_usd: 10.0,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn entry(tenant_id: &str, period: &str, tokens: i64, cost: f64) -> UsageLogEntry {
        UsageLogEntry {
            tenant_id: tenant_id.to_string(),
            endpoint: "openai.chat_completions".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            input_tokens: tokens,
            output_tokens: 0,
            total_tokens: tokens,
            cost_usd: cost,
            metadata: serde_json::json!({"tenant_slug": "acme"}),
            created_at: Utc::now(),
            period: period.to_string(),
        }
    }

    #[tokio::test]
    async fn test_find_by_slug() {
        let (store, _dir) = store().await;
        store.upsert_tenant(&tenant("t-1", "acme")).await.unwrap();

        let found = store.find_by_slug("acme").await.unwrap().unwrap();
        assert_eq!(found.id, "t-1");
        assert_eq!(found.secret, "s3cret");
        assert!(found.active);
        assert!(store.find_by_slug("globex").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_aggregate_before_first_entry() {
        let (store, _dir) = store().await;
        store.upsert_tenant(&tenant("t-1", "acme")).await.unwrap();
        assert!(store.monthly_aggregate("t-1", "2024-05").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trigger_keeps_aggregate_equal_to_log_sum() {
        let (store, _dir) = store().await;
        store.upsert_tenant(&tenant("t-1", "acme")).await.unwrap();
        store.upsert_tenant(&tenant("t-2", "globex")).await.unwrap();

        store.append_usage(&entry("t-1", "2024-05", 100, 0.5)).await.unwrap();
        store.append_usage(&entry("t-1", "2024-05", 50, 0.25)).await.unwrap();
        store.append_usage(&entry("t-1", "2024-06", 7, 0.01)).await.unwrap();
        store.append_usage(&entry("t-2", "2024-05", 1, 0.001)).await.unwrap();

        let may = store.monthly_aggregate("t-1", "2024-05").await.unwrap().unwrap();
        assert_eq!(may.total_requests, 2);
        assert_eq!(may.total_tokens, 150);
        assert!((may.total_cost_usd - 0.75).abs() < 1e-12);

        let june = store.monthly_aggregate("t-1", "2024-06").await.unwrap().unwrap();
        assert_eq!(june.total_requests, 1);
        assert_eq!(june.total_tokens, 7);

        let entries = store.usage_entries("t-1").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].metadata["tenant_slug"], "acme");
    }

    #[tokio::test]
    async fn test_health_check() {
        let (store, _dir) = store().await;
        assert!(store.health_check().await);
    }
}
