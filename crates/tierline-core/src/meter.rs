//! Per-user, per-day usage metering for rate-limited actions.
//!
//! Counters are keyed by `(action, UTC day, user id)`. A new day is a new key,
//! so rollover needs no cleanup job and a counter never decreases within its
//! day. The check and the charge happen in one atomic store operation
//! ([`CounterStore::increment_if_below`]); [`UsageMeter::peek`] is the only
//! way to look without charging.

use crate::entitlement::PaywallSignal;
use crate::error::Result;
use crate::tier::Tier;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// UsageDay
// ---------------------------------------------------------------------------

/// Calendar day in UTC. Client and server agree on it regardless of the
/// device timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageDay(NaiveDate);

impl UsageDay {
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.succ_opt().unwrap_or(self.0))
    }
}

impl fmt::Display for UsageDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl std::str::FromStr for UsageDay {
    type Err = crate::error::TierlineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| crate::error::TierlineError::InvalidRequest(format!("invalid day '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Limit / UsagePolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Daily(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePolicy {
    /// Tiers at or above this one are never metered.
    #[serde(default = "default_unlimited_from")]
    pub unlimited_from: Tier,
    /// Action → allowance per day for metered tiers.
    #[serde(default = "default_daily_limits")]
    pub daily_limits: BTreeMap<String, u32>,
}

fn default_unlimited_from() -> Tier {
    Tier::Premium
}

fn default_daily_limits() -> BTreeMap<String, u32> {
    let mut m = BTreeMap::new();
    m.insert("chat".to_string(), 3);
    m
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            unlimited_from: default_unlimited_from(),
            daily_limits: default_daily_limits(),
        }
    }
}

impl UsagePolicy {
    /// Metered tiers get zero allowance for actions missing from the table.
    pub fn limit_for(&self, tier: Tier, action: &str) -> Limit {
        if tier >= self.unlimited_from {
            return Limit::Unlimited;
        }
        Limit::Daily(self.daily_limits.get(action).copied().unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// CounterKey / CounterStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub action: String,
    pub day: UsageDay,
    pub user_id: String,
}

impl CounterKey {
    pub fn new(user_id: &str, action: &str, day: UsageDay) -> Self {
        Self {
            action: action.to_string(),
            day,
            user_id: user_id.to_string(),
        }
    }

    /// Flat store key: `<action>/<YYYY-MM-DD>/<user_id>`.
    pub fn encode(&self) -> String {
        format!("{}/{}/{}", self.action, self.day, self.user_id)
    }
}

/// Backing storage for usage counters.
pub trait CounterStore {
    /// Current value, 0 when the counter has not been created yet.
    fn read(&self, key: &CounterKey) -> Result<u32>;

    /// Atomically increment when the current value is below `limit`.
    /// Returns the new value, or `None` without writing when exhausted.
    fn increment_if_below(&self, key: &CounterKey, limit: u32) -> Result<Option<u32>>;
}

/// In-process counters. Single-process only; use the redb store when more
/// than one server shares an account.
#[derive(Debug, Default)]
pub struct MemoryCounters {
    counts: Mutex<HashMap<String, u32>>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounters {
    fn read(&self, key: &CounterKey) -> Result<u32> {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(counts.get(&key.encode()).copied().unwrap_or(0))
    }

    fn increment_if_below(&self, key: &CounterKey, limit: u32) -> Result<Option<u32>> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counts.entry(key.encode()).or_insert(0);
        if *entry >= limit {
            return Ok(None);
        }
        *entry += 1;
        Ok(Some(*entry))
    }
}

// ---------------------------------------------------------------------------
// Quota / UsageMeter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub allowed: bool,
    /// `None` for unlimited tiers.
    pub remaining: Option<u32>,
    pub used: u32,
    pub limit: Option<u32>,
}

impl Quota {
    fn unlimited(used: u32) -> Self {
        Self {
            allowed: true,
            remaining: None,
            used,
            limit: None,
        }
    }

    /// Paywall signal for a denied quota; `None` when allowed.
    pub fn paywall_signal(&self, action: &str) -> Option<PaywallSignal> {
        if self.allowed {
            return None;
        }
        Some(PaywallSignal::LimitReached {
            action: action.to_string(),
            limit: self.limit.unwrap_or(0),
        })
    }
}

pub struct UsageMeter<'a, S: CounterStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: CounterStore + ?Sized> UsageMeter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Report the quota without charging.
    pub fn peek(&self, user_id: &str, action: &str, limit: Limit, day: UsageDay) -> Result<Quota> {
        let key = CounterKey::new(user_id, action, day);
        let used = self.store.read(&key)?;
        Ok(match limit {
            Limit::Unlimited => Quota::unlimited(used),
            Limit::Daily(max) => Quota {
                allowed: used < max,
                remaining: Some(max.saturating_sub(used)),
                used,
                limit: Some(max),
            },
        })
    }

    /// Charge one unit if the allowance permits. A denied call does not
    /// change the counter; an unlimited call does not touch it at all.
    pub fn try_consume(
        &self,
        user_id: &str,
        action: &str,
        limit: Limit,
        day: UsageDay,
    ) -> Result<Quota> {
        let key = CounterKey::new(user_id, action, day);
        let max = match limit {
            Limit::Unlimited => return Ok(Quota::unlimited(self.store.read(&key)?)),
            Limit::Daily(max) => max,
        };
        match self.store.increment_if_below(&key, max)? {
            Some(used) => Ok(Quota {
                allowed: true,
                remaining: Some(max - used),
                used,
                limit: Some(max),
            }),
            None => {
                tracing::debug!(user_id, action, %day, limit = max, "daily limit reached");
                Ok(Quota {
                    allowed: false,
                    remaining: Some(0),
                    used: self.store.read(&key)?,
                    limit: Some(max),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
