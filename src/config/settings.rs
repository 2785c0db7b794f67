//! Application settings and configuration
//!
//! This module provides configuration management for the gateway,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Which backend holds the tenant registry and usage store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    DynamoDb,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "dynamodb" | "dynamo" => Ok(StorageBackend::DynamoDb),
            _ => anyhow::bail!("Invalid storage backend: {}. Expected: sqlite or dynamodb", s),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::DynamoDb => write!(f, "dynamodb"),
        }
    }
}

/// Connection settings for one upstream provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    /// Provider name used for pricing lookups and usage records
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub default_model: String,
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,

    // Storage
    pub storage_backend: StorageBackend,
    #[serde(skip_serializing)]
    pub database_url: String,

    // AWS settings (DynamoDB backend only)
    pub aws_region: String,
    pub dynamodb_endpoint_url: Option<String>,
    pub dynamodb_tenants_table: String,
    pub dynamodb_usage_log_table: String,
    pub dynamodb_monthly_usage_table: String,

    // Upstream providers
    pub anthropic: UpstreamSettings,
    pub openai: UpstreamSettings,
    pub openai_embedding_model: String,
    pub generic: UpstreamSettings,

    // Pricing
    /// Provider whose default price row applies to unknown providers
    pub primary_provider: String,
    /// Optional JSON file merged over the built-in pricing table
    pub pricing_file: Option<PathBuf>,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let settings = Self {
            app_name: env_or_default("APP_NAME", &defaults.app_name),
            app_version: defaults.app_version,
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", &defaults.log_level),

            host: env_or_default("HOST", &defaults.host),
            port: env_or_default("PORT", "8000")
                .parse()
                .context("Invalid PORT value")?,

            storage_backend: env_or_default("STORAGE_BACKEND", "sqlite")
                .parse()
                .context("Invalid STORAGE_BACKEND value")?,
            database_url: env_or_default("DATABASE_URL", &defaults.database_url),

            aws_region: env_or_default("AWS_REGION", &defaults.aws_region),
            dynamodb_endpoint_url: env::var("DYNAMODB_ENDPOINT_URL").ok(),
            dynamodb_tenants_table: env_or_default(
                "DYNAMODB_TENANTS_TABLE",
                &defaults.dynamodb_tenants_table,
            ),
            dynamodb_usage_log_table: env_or_default(
                "DYNAMODB_USAGE_LOG_TABLE",
                &defaults.dynamodb_usage_log_table,
            ),
            dynamodb_monthly_usage_table: env_or_default(
                "DYNAMODB_MONTHLY_USAGE_TABLE",
                &defaults.dynamodb_monthly_usage_table,
            ),

            anthropic: UpstreamSettings {
                name: defaults.anthropic.name,
                base_url: env_or_default("ANTHROPIC_BASE_URL", &defaults.anthropic.base_url),
                api_key: non_empty_env("ANTHROPIC_API_KEY"),
                default_model: env_or_default(
                    "ANTHROPIC_DEFAULT_MODEL",
                    &defaults.anthropic.default_model,
                ),
            },
            openai: UpstreamSettings {
                name: defaults.openai.name,
                base_url: env_or_default("OPENAI_BASE_URL", &defaults.openai.base_url),
                api_key: non_empty_env("OPENAI_API_KEY"),
                default_model: env_or_default("OPENAI_DEFAULT_MODEL", &defaults.openai.default_model),
            },
            openai_embedding_model: env_or_default(
                "OPENAI_DEFAULT_EMBEDDING_MODEL",
                &defaults.openai_embedding_model,
            ),
            generic: UpstreamSettings {
                name: env_or_default("GENERIC_PROVIDER_NAME", &defaults.generic.name),
                base_url: env_or_default("GENERIC_BASE_URL", &defaults.generic.base_url),
                api_key: non_empty_env("GENERIC_API_KEY"),
                default_model: env_or_default(
                    "GENERIC_DEFAULT_MODEL",
                    &defaults.generic.default_model,
                ),
            },

            primary_provider: env_or_default("PRIMARY_PROVIDER", &defaults.primary_provider),
            pricing_file: env::var("PRICING_FILE").ok().map(PathBuf::from),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.storage_backend == StorageBackend::Sqlite && self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is required for the sqlite storage backend");
        }

        for upstream in [&self.anthropic, &self.openai, &self.generic] {
            if upstream.base_url.is_empty() {
                anyhow::bail!("Base URL for provider '{}' cannot be empty", upstream.name);
            }
        }

        if self.primary_provider.is_empty() {
            anyhow::bail!("PRIMARY_PROVIDER cannot be empty");
        }

        Ok(())
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "llm-metering-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage_backend: StorageBackend::Sqlite,
            database_url: "sqlite://gateway.db".to_string(),
            aws_region: "us-east-1".to_string(),
            dynamodb_endpoint_url: None,
            dynamodb_tenants_table: "gateway-tenant-clients".to_string(),
            dynamodb_usage_log_table: "gateway-usage-logs".to_string(),
            dynamodb_monthly_usage_table: "gateway-monthly-usage".to_string(),
            anthropic: UpstreamSettings {
                name: "anthropic".to_string(),
                base_url: "https://api.anthropic.com".to_string(),
                api_key: None,
                default_model: "claude-sonnet-4-20250514".to_string(),
            },
            openai: UpstreamSettings {
                name: "openai".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key: None,
                default_model: "gpt-4o-mini".to_string(),
            },
            openai_embedding_model: "text-embedding-3-small".to_string(),
            generic: UpstreamSettings {
                name: "openrouter".to_string(),
                base_url: "https://openrouter.ai/api".to_string(),
                api_key: None,
                default_model: "openai/gpt-4o-mini".to_string(),
            },
            primary_provider: "openai".to_string(),
            pricing_file: None,
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
