use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use tierline_core::config::Config;
use tierline_core::db::Store;
use tierline_core::entitlement::{Decision, PaywallSignal};
use tierline_core::ledger::TierLedger;

/// Resolve one entitlement against the ledger. Denial is a normal answer,
/// not an error.
pub fn run(root: &Path, user_id: &str, feature: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = Store::open_root(root).context("failed to open store")?;
    let snapshot = store.read_snapshot(user_id)?;
    let decision = config.features.decide(&snapshot, feature);

    if json {
        let paywall = match &decision {
            Decision::Allowed => None,
            Decision::Denied(signal) => Some(signal),
        };
        return print_json(&serde_json::json!({
            "user_id": user_id,
            "feature": feature,
            "tier": snapshot.tier,
            "allowed": decision.is_allowed(),
            "paywall": paywall,
        }));
    }

    match decision {
        Decision::Allowed => println!("allowed ({})", snapshot.tier),
        Decision::Denied(PaywallSignal::UpgradeRequired {
            required_tier: Some(required),
            ..
        }) => println!("denied: requires {required} (has {})", snapshot.tier),
        Decision::Denied(_) => println!("denied: '{feature}' is not offered at any tier"),
    }
    Ok(())
}
