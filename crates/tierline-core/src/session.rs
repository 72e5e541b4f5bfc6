//! Per-session view of the signed-in user's entitlements.
//!
//! The cached snapshot exists for display only. Anything that decides
//! whether to show a paywall goes through [`TierSession::authoritative`],
//! which re-reads the ledger and refreshes the cache.

use crate::entitlement::UserSnapshot;
use crate::error::Result;
use crate::ledger::TierLedger;

#[derive(Debug, Default)]
pub struct TierSession {
    user_id: Option<String>,
    cached: Option<UserSnapshot>,
}

impl TierSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `user_id`. Whatever was cached for the previous user is gone.
    pub fn sign_in(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
        self.cached = None;
    }

    pub fn sign_out(&mut self) {
        self.user_id = None;
        self.cached = None;
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Last snapshot read for the current user, possibly stale.
    pub fn cached(&self) -> Option<&UserSnapshot> {
        self.cached.as_ref()
    }

    /// Fresh snapshot from the ledger. Returns `None` when signed out.
    pub fn authoritative<L: TierLedger + ?Sized>(
        &mut self,
        ledger: &L,
    ) -> Result<Option<UserSnapshot>> {
        let Some(ref user_id) = self.user_id else {
            return Ok(None);
        };
        let snapshot = ledger.read_snapshot(user_id)?;
        self.cached = Some(snapshot.clone());
        Ok(Some(snapshot))
    }
}
