//! Monthly quota admission
//!
//! The check reads the tenant's aggregate for the current UTC calendar month
//! and compares it with the tenant's ceilings. It is advisory: nothing is
//! reserved, so concurrent requests from one tenant can all pass before any
//! of their usage lands, overshooting by at most the usage of the requests
//! in flight. Closing that window would need an atomic reservation on the
//! aggregate row that is reconciled after the call and released on failure.

use serde::Serialize;

use crate::db::models::{current_period_key, AuthenticatedClient, MonthlyUsageAggregate};
use crate::db::store::{StoreError, UsageStore};

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuotaDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Compare an aggregate with a tenant's ceilings.
///
/// Ceilings are inclusive: usage equal to a limit blocks further requests.
/// When both limits are reached the token reason wins.
pub fn evaluate(
    client: &AuthenticatedClient,
    aggregate: Option<&MonthlyUsageAggregate>,
) -> QuotaDecision {
    let Some(aggregate) = aggregate else {
        return QuotaDecision::allow();
    };

    if aggregate.total_tokens >= client.monthly_token_limit {
        return QuotaDecision::deny(format!(
            "token limit reached: {}/{}",
            aggregate.total_tokens, client.monthly_token_limit
        ));
    }

    if aggregate.total_cost_usd >= client.monthly_cost_limit_usd {
        return QuotaDecision::deny(format!(
            "cost limit reached: {:.4}/{:.4}",
            aggregate.total_cost_usd, client.monthly_cost_limit_usd
        ));
    }

    QuotaDecision::allow()
}

/// Check a tenant against its limits for the current period
pub async fn check_limit(
    store: &dyn UsageStore,
    client: &AuthenticatedClient,
) -> Result<QuotaDecision, StoreError> {
    let period = current_period_key();
    let aggregate = store.monthly_aggregate(&client.id, &period).await?;

    let decision = evaluate(client, aggregate.as_ref());
    if !decision.allowed {
        tracing::info!(
            tenant = %client.slug,
            period = %period,
            reason = ?decision.reason,
            "Tenant over monthly quota"
        );
    }

    Ok(decision)
}
