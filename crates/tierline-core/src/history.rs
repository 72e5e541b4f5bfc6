use crate::tier::Tier;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Active => f.write_str("active"),
        }
    }
}

/// One append-only row of the subscription audit log. Never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Tier the payment paid for, which may be lower than the tier the
    /// account ends up holding.
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub amount: u64,
    pub currency: String,
    pub period_start: DateTime<Utc>,
    pub session_id: String,
    pub event_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Revenue aggregate for one UTC day in one currency. Only ever incremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueDay {
    pub day: NaiveDate,
    pub currency: String,
    /// Sum of minor-unit amounts.
    pub amount_total: u64,
    pub payments: u32,
}

impl RevenueDay {
    pub fn empty(day: NaiveDate, currency: &str) -> Self {
        Self {
            day,
            currency: currency.to_ascii_lowercase(),
            amount_total: 0,
            payments: 0,
        }
    }

    pub fn add(&mut self, amount: u64) {
        self.amount_total = self.amount_total.saturating_add(amount);
        self.payments = self.payments.saturating_add(1);
    }
}
