//! Tier ledger: the authoritative record of each account's tier and
//! permission overrides.
//!
//! The resolver and the meter only ever read through [`TierLedger`]. Writes
//! come from payment reconciliation and from administrative commands.

use crate::db::Store;
use crate::entitlement::{Entitled, UserSnapshot};
use crate::error::Result;
use crate::tier::{self, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "tier::deserialize_lenient")]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            email,
            tier: Tier::Free,
            overrides: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            tier: self.tier,
            overrides: self.overrides.clone(),
        }
    }
}

impl Entitled for Account {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn has_override(&self, feature: &str) -> bool {
        self.overrides.get(feature).copied().unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// TierLedger
// ---------------------------------------------------------------------------

pub trait TierLedger {
    fn read_tier(&self, user_id: &str) -> Result<Tier>;

    /// Tier plus overrides, everything an entitlement decision needs.
    fn read_snapshot(&self, user_id: &str) -> Result<UserSnapshot>;

    fn write_tier(&self, user_id: &str, tier: Tier) -> Result<()>;
}

impl TierLedger for Store {
    fn read_tier(&self, user_id: &str) -> Result<Tier> {
        Ok(self.account(user_id)?.tier)
    }

    fn read_snapshot(&self, user_id: &str) -> Result<UserSnapshot> {
        Ok(self.account(user_id)?.snapshot())
    }

    /// Administrative set. Unlike reconciliation this may lower the tier.
    fn write_tier(&self, user_id: &str, tier: Tier) -> Result<()> {
        let previous = self.read_tier(user_id)?;
        self.update_account(user_id, |a| a.tier = tier)?;
        tracing::info!(user_id, from = %previous, to = %tier, "tier written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

impl Store {
    /// Grant `feature` to `user_id` regardless of tier.
    pub fn grant_override(&self, user_id: &str, feature: &str) -> Result<Account> {
        let account = self.update_account(user_id, |a| {
            a.overrides.insert(feature.to_string(), true);
        })?;
        tracing::info!(user_id, feature, "override granted");
        Ok(account)
    }

    /// Remove any override for `feature`. Access falls back to the tier.
    pub fn revoke_override(&self, user_id: &str, feature: &str) -> Result<Account> {
        let account = self.update_account(user_id, |a| {
            a.overrides.remove(feature);
        })?;
        tracing::info!(user_id, feature, "override revoked");
        Ok(account)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::FeatureGates;
    use crate::error::TierlineError;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn new_accounts_start_free() {
        let (_dir, store) = open_tmp();
        store.create_account("u1", None).unwrap();
        assert_eq!(store.read_tier("u1").unwrap(), Tier::Free);
    }

    #[test]
    fn write_tier_can_raise_and_lower() {
        let (_dir, store) = open_tmp();
        store.create_account("u1", None).unwrap();
        store.write_tier("u1", Tier::Elite).unwrap();
        assert_eq!(store.read_tier("u1").unwrap(), Tier::Elite);
        store.write_tier("u1", Tier::Free).unwrap();
        assert_eq!(store.read_tier("u1").unwrap(), Tier::Free);
    }

    #[test]
    fn unknown_account_is_not_found() {
        let (_dir, store) = open_tmp();
        assert!(matches!(
            store.read_tier("ghost"),
            Err(TierlineError::AccountNotFound(_))
        ));
        assert!(matches!(
            store.write_tier("ghost", Tier::Elite),
            Err(TierlineError::AccountNotFound(_))
        ));
    }

    #[test]
    fn override_grant_and_revoke() {
        let (_dir, store) = open_tmp();
        let gates = FeatureGates::default();
        store.create_account("u1", None).unwrap();

        let account = store.grant_override("u1", "blackbook").unwrap();
        assert!(gates.is_allowed(&account, "blackbook"));

        let account = store.revoke_override("u1", "blackbook").unwrap();
        assert!(!gates.is_allowed(&account, "blackbook"));
        assert!(account.overrides.is_empty());
    }

    #[test]
    fn stored_unknown_tier_reads_as_free() {
        let raw = r#"{
            "user_id": "u1",
            "tier": "legacy-gold",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        }"#;
        let account: Account = serde_json::from_str(raw).unwrap();
        assert_eq!(account.tier, Tier::Free);
    }
}
