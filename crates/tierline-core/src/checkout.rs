use crate::config::Config;
use crate::error::{Result, TierlineError};
use crate::paths;
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side price for a tier. Amounts are in the currency's minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: u64,
    pub currency: String,
    pub interval: BillingInterval,
}

impl Price {
    pub fn monthly(amount: u64, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
            interval: BillingInterval::Month,
        }
    }
}

// ---------------------------------------------------------------------------
// CheckoutRequest
// ---------------------------------------------------------------------------

/// Body of an upgrade request from the client. Fields are optional here so
/// a missing field is reported as a validation error rather than a
/// deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "successUrl")]
    pub success_url: Option<String>,
    #[serde(default, alias = "cancelUrl")]
    pub cancel_url: Option<String>,
}

/// A validated request with the price resolved from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub tier: Tier,
    pub user_id: String,
    pub price: Price,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    pub fn validate(&self, config: &Config) -> Result<CheckoutPlan> {
        let tier_raw = non_empty(self.tier.as_deref())
            .ok_or_else(|| TierlineError::InvalidRequest("missing required field 'tier'".into()))?;
        let user_id = non_empty(self.user_id.as_deref()).ok_or_else(|| {
            TierlineError::InvalidRequest("missing required field 'user_id'".into())
        })?;
        paths::validate_user_id(user_id)?;

        let tier: Tier = tier_raw.to_ascii_lowercase().parse()?;
        let price = config.price_for(tier)?.clone();

        Ok(CheckoutPlan {
            tier,
            user_id: user_id.to_string(),
            price,
            success_url: non_empty(self.success_url.as_deref())
                .unwrap_or(config.providers.success_url.as_str())
                .to_string(),
            cancel_url: non_empty(self.cancel_url.as_deref())
                .unwrap_or(config.providers.cancel_url.as_str())
                .to_string(),
        })
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// CheckoutSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Opened with the provider; nothing recorded locally.
    Created,
    /// The provider reported the payment as complete.
    Completed,
    /// The payment has been applied to the ledger.
    Reconciled,
}

/// A checkout session as seen in a completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Identity attached when the session was created.
    pub user_id: Option<String>,
    /// Payer email captured by the provider at payment time.
    pub email: Option<String>,
    pub requested_tier: Option<Tier>,
    pub price_id: Option<String>,
    pub amount_total: u64,
    pub currency: String,
    pub status: CheckoutStatus,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
