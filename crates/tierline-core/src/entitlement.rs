//! Feature gating.
//!
//! A feature is allowed when the user holds an explicit `true` override for
//! it, or when their tier is at or above the feature's configured minimum.
//! Feature keys missing from the gate table are denied for every tier.

use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Entitled
// ---------------------------------------------------------------------------

/// Anything the resolver can make a decision about.
pub trait Entitled {
    fn tier(&self) -> Tier;

    /// `true` only for an explicit grant. There is no per-user deny.
    fn has_override(&self, feature: &str) -> bool;
}

/// Point-in-time copy of a user's entitlement inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, bool>,
}

impl UserSnapshot {
    pub fn with_tier(tier: Tier) -> Self {
        Self {
            tier,
            overrides: BTreeMap::new(),
        }
    }
}

impl Entitled for UserSnapshot {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn has_override(&self, feature: &str) -> bool {
        self.overrides.get(feature).copied().unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// PaywallSignal / Decision
// ---------------------------------------------------------------------------

/// Why a user action was interrupted. Consumed by the paywall presenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PaywallSignal {
    UpgradeRequired {
        feature: String,
        /// `None` when the feature is not sold at any tier.
        required_tier: Option<Tier>,
    },
    LimitReached {
        action: String,
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(PaywallSignal),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

// ---------------------------------------------------------------------------
// FeatureGates
// ---------------------------------------------------------------------------

/// Static feature → minimum tier table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureGates(BTreeMap<String, Tier>);

impl Default for FeatureGates {
    fn default() -> Self {
        let mut m = BTreeMap::new();
        m.insert("chat".to_string(), Tier::Free);
        m.insert("codex".to_string(), Tier::Premium);
        m.insert("vault".to_string(), Tier::Premium);
        m.insert("blackbook".to_string(), Tier::Elite);
        Self(m)
    }
}

impl FeatureGates {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, feature: impl Into<String>, min_tier: Tier) {
        self.0.insert(feature.into(), min_tier);
    }

    pub fn remove(&mut self, feature: &str) -> Option<Tier> {
        self.0.remove(feature)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.0.contains_key(feature)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, Tier)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    pub fn min_tier(&self, feature: &str) -> Option<Tier> {
        self.0.get(feature).copied()
    }

    pub fn is_allowed(&self, user: &impl Entitled, feature: &str) -> bool {
        self.decide(user, feature).is_allowed()
    }

    pub fn decide(&self, user: &impl Entitled, feature: &str) -> Decision {
        if feature.is_empty() {
            return Decision::Denied(PaywallSignal::UpgradeRequired {
                feature: String::new(),
                required_tier: None,
            });
        }
        if user.has_override(feature) {
            return Decision::Allowed;
        }
        match self.min_tier(feature) {
            Some(min) if user.tier() >= min => Decision::Allowed,
            required_tier => Decision::Denied(PaywallSignal::UpgradeRequired {
                feature: feature.to_string(),
                required_tier,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
