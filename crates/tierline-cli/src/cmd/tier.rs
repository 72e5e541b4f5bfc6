use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use tierline_core::config::Config;
use tierline_core::db::Store;
use tierline_core::error::TierlineError;
use tierline_core::ledger::TierLedger;
use tierline_core::tier::Tier;

#[derive(Subcommand)]
pub enum TierSubcommand {
    /// Show the tier an account holds
    Show { user_id: String },

    /// Set an account's tier. Unlike payments, this can lower it.
    Set {
        user_id: String,
        /// free, premium or elite
        tier: String,
    },
}

#[derive(Subcommand)]
pub enum OverrideSubcommand {
    /// Grant a feature regardless of tier
    Grant { user_id: String, feature: String },

    /// Remove a granted feature; access falls back to the tier
    Revoke { user_id: String, feature: String },
}

pub fn run(root: &Path, subcmd: TierSubcommand, json: bool) -> anyhow::Result<()> {
    let store = Store::open_root(root).context("failed to open store")?;
    match subcmd {
        TierSubcommand::Show { user_id } => {
            let tier = store.read_tier(&user_id)?;
            if json {
                print_json(&serde_json::json!({ "user_id": user_id, "tier": tier }))?;
            } else {
                println!("{tier}");
            }
        }
        TierSubcommand::Set { user_id, tier } => {
            let tier: Tier = tier.to_ascii_lowercase().parse()?;
            let previous = store.read_tier(&user_id)?;
            store.write_tier(&user_id, tier)?;
            if json {
                print_json(&serde_json::json!({
                    "user_id": user_id,
                    "from": previous,
                    "to": tier,
                }))?;
            } else {
                println!("{user_id}: {previous} -> {tier}");
            }
        }
    }
    Ok(())
}

pub fn run_override(root: &Path, subcmd: OverrideSubcommand, json: bool) -> anyhow::Result<()> {
    let store = Store::open_root(root).context("failed to open store")?;
    let account = match subcmd {
        OverrideSubcommand::Grant { user_id, feature } => {
            let config = Config::load(root).context("failed to load config")?;
            if !config.features.contains(&feature) {
                return Err(TierlineError::UnknownFeature(feature).into());
            }
            let account = store.grant_override(&user_id, &feature)?;
            if !json {
                println!("Granted '{feature}' to {user_id}");
            }
            account
        }
        OverrideSubcommand::Revoke { user_id, feature } => {
            let account = store.revoke_override(&user_id, &feature)?;
            if !json {
                println!("Revoked '{feature}' from {user_id}");
            }
            account
        }
    };
    if json {
        print_json(&account)?;
    }
    Ok(())
}
