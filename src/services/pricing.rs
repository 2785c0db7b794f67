//! Pricing table and cost calculation
//!
//! Prices are USD per million tokens, keyed by `(provider, model)`. Each
//! provider carries a `default` row for models it does not list, and
//! providers that are not listed at all are billed at the primary
//! provider's default row.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Model name of the per-provider fallback row
pub const DEFAULT_MODEL_KEY: &str = "default";

/// Price per million tokens for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }
}

const BUILTIN_PRICES: &[(&str, &str, ModelPrice)] = &[
    ("openai", "gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
    ("openai", "gpt-4o", ModelPrice::new(2.50, 10.00)),
    ("openai", "gpt-4.1", ModelPrice::new(2.00, 8.00)),
    ("openai", "gpt-4.1-mini", ModelPrice::new(0.40, 1.60)),
    ("openai", "gpt-4.1-nano", ModelPrice::new(0.10, 0.40)),
    ("openai", "text-embedding-3-small", ModelPrice::new(0.02, 0.0)),
    ("openai", "text-embedding-3-large", ModelPrice::new(0.13, 0.0)),
    ("openai", DEFAULT_MODEL_KEY, ModelPrice::new(0.15, 0.60)),
    ("anthropic", "claude-sonnet-4-20250514", ModelPrice::new(3.00, 15.00)),
    ("anthropic", "claude-3-5-sonnet-20241022", ModelPrice::new(3.00, 15.00)),
    ("anthropic", "claude-3-5-haiku-20241022", ModelPrice::new(0.80, 4.00)),
    ("anthropic", "claude-opus-4-20250514", ModelPrice::new(15.00, 75.00)),
    ("anthropic", DEFAULT_MODEL_KEY, ModelPrice::new(3.00, 15.00)),
];

/// Errors raised while building a pricing table
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("failed to read pricing file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pricing json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid price for {provider}/{model}: prices must be finite and non-negative")]
    InvalidPrice { provider: String, model: String },

    #[error("primary provider '{0}' has no default price row")]
    MissingPrimaryDefault(String),
}

/// Immutable `(provider, model)` price lookup
#[derive(Debug, Clone)]
pub struct PricingTable {
    providers: HashMap<String, HashMap<String, ModelPrice>>,
    fallback: ModelPrice,
}

impl PricingTable {
    /// Built-in prices with `primary_provider`'s default row as the global
    /// fallback
    pub fn builtin(primary_provider: &str) -> Result<Self, PricingError> {
        let mut providers: HashMap<String, HashMap<String, ModelPrice>> = HashMap::new();
        for (provider, model, price) in BUILTIN_PRICES {
            providers
                .entry(provider.to_string())
                .or_default()
                .insert(model.to_string(), *price);
        }
        Self::from_rows(providers, primary_provider)
    }

    /// Built-in prices with overrides from a JSON file of shape
    /// `{"provider": {"model": {"input_per_million": .., "output_per_million": ..}}}`
    pub fn with_overrides_file(
        primary_provider: &str,
        path: &Path,
    ) -> Result<Self, PricingError> {
        let raw = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, HashMap<String, ModelPrice>> = serde_json::from_str(&raw)?;

        let mut table = Self::builtin(primary_provider)?;
        for (provider, models) in overrides {
            table.providers.entry(provider).or_default().extend(models);
        }

        tracing::info!(path = %path.display(), "Loaded pricing overrides");
        Self::from_rows(table.providers, primary_provider)
    }

    fn from_rows(
        providers: HashMap<String, HashMap<String, ModelPrice>>,
        primary_provider: &str,
    ) -> Result<Self, PricingError> {
        for (provider, models) in &providers {
            for (model, price) in models {
                let valid = |p: f64| p.is_finite() && p >= 0.0;
                if !valid(price.input_per_million) || !valid(price.output_per_million) {
                    return Err(PricingError::InvalidPrice {
                        provider: provider.clone(),
                        model: model.clone(),
                    });
                }
            }
        }

        let fallback = providers
            .get(primary_provider)
            .and_then(|models| models.get(DEFAULT_MODEL_KEY))
            .copied()
            .ok_or_else(|| PricingError::MissingPrimaryDefault(primary_provider.to_string()))?;

        Ok(Self { providers, fallback })
    }

    /// Resolve the price row for a call.
    ///
    /// Unknown model falls back to the provider's `default` row; unknown
    /// provider falls back to the primary provider's default row.
    pub fn price_for(&self, provider: &str, model: &str) -> ModelPrice {
        match self.providers.get(provider) {
            Some(models) => models
                .get(model)
                .or_else(|| models.get(DEFAULT_MODEL_KEY))
                .copied()
                .unwrap_or(self.fallback),
            None => self.fallback,
        }
    }

    /// USD cost of a call. Never rounded.
    pub fn cost(&self, provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self.price_for(provider, model);
        input_tokens as f64 / 1_000_000.0 * price.input_per_million
            + output_tokens as f64 / 1_000_000.0 * price.output_per_million
    }

    /// Every `(provider, model, price)` row in the table
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, ModelPrice)> {
        self.providers.iter().flat_map(|(provider, models)| {
            models
                .iter()
                .map(move |(model, price)| (provider.as_str(), model.as_str(), *price))
        })
    }
}
