//! Application state container
//!
//! Shared resources passed to every handler via Axum's state extraction.
//! Everything here is either immutable after startup or internally
//! synchronised, so cloning the state per request is cheap.

use crate::config::{create_dynamodb_client, Settings, StorageBackend};
use crate::db::{DynamoDbClient, DynamoDbStore, SqliteStore, TenantRegistry, UsageStore};
use crate::middleware::metrics::GatewayMetrics;
use crate::services::forwarder::{Forwarder, GatewayConfig};
use crate::services::usage_logger::UsageLogger;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Upstreams and pricing, fixed for the life of the process
    pub config: Arc<GatewayConfig>,

    /// Tenant lookups for authentication
    pub registry: Arc<dyn TenantRegistry>,

    /// Usage log and monthly aggregates
    pub usage_store: Arc<dyn UsageStore>,

    /// HTTP client for provider calls
    pub forwarder: Forwarder,

    pub usage_logger: UsageLogger,

    pub metrics: Arc<GatewayMetrics>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Create the application state, opening the configured storage backend.
    ///
    /// The SQLite schema is created if it does not exist yet. DynamoDB
    /// tables are expected to be provisioned already.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);

        let (registry, usage_store): (Arc<dyn TenantRegistry>, Arc<dyn UsageStore>) =
            match settings.storage_backend {
                StorageBackend::Sqlite => {
                    tracing::debug!("Opening SQLite store");
                    let store = Arc::new(SqliteStore::connect(&settings.database_url).await?);
                    store.migrate().await?;
                    let registry: Arc<dyn TenantRegistry> = store.clone();
                    let usage_store: Arc<dyn UsageStore> = store;
                    (registry, usage_store)
                }
                StorageBackend::DynamoDb => {
                    tracing::debug!(
                        region = %settings.aws_region,
                        endpoint = ?settings.dynamodb_endpoint_url,
                        "Creating DynamoDB client"
                    );
                    let sdk_client = create_dynamodb_client(&settings).await;
                    let client = Arc::new(DynamoDbClient::new(settings.clone(), sdk_client));
                    let store = Arc::new(DynamoDbStore::new(client));
                    let registry: Arc<dyn TenantRegistry> = store.clone();
                    let usage_store: Arc<dyn UsageStore> = store;
                    (registry, usage_store)
                }
            };

        let state = Self::from_parts(settings, registry, usage_store)?;
        tracing::info!(
            storage_backend = %state.settings.storage_backend,
            "Application state initialized successfully"
        );

        Ok(state)
    }

    /// Assemble the state around already-open stores
    pub fn from_parts(
        settings: Arc<Settings>,
        registry: Arc<dyn TenantRegistry>,
        usage_store: Arc<dyn UsageStore>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(GatewayConfig::from_settings(&settings)?);
        let metrics = Arc::new(GatewayMetrics::new()?);
        let forwarder = Forwarder::new()?;
        let usage_logger = UsageLogger::new(usage_store.clone(), metrics.clone());

        for upstream in [&config.anthropic, &config.openai, &config.generic] {
            if upstream.api_key.is_none() {
                tracing::warn!(
                    provider = %upstream.name,
                    "No upstream API key configured; requests to this provider will fail"
                );
            }
        }

        Ok(Self {
            settings,
            config,
            registry,
            usage_store,
            forwarder,
            usage_logger,
            metrics,
            start_time: Instant::now(),
        })
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
