use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::collections::BTreeSet;
use std::path::Path;
use tierline_core::config::Config;
use tierline_core::db::Store;
use tierline_core::ledger::TierLedger;
use tierline_core::meter::{Quota, UsageDay, UsageMeter};

#[derive(Subcommand)]
pub enum UsageSubcommand {
    /// Show quotas for every metered action
    Show {
        user_id: String,
        /// UTC day as YYYY-MM-DD (default: today)
        #[arg(long)]
        day: Option<String>,
    },

    /// Charge one unit of `action` for today; fails when the allowance is spent
    Consume { user_id: String, action: String },
}

pub fn run(root: &Path, subcmd: UsageSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = Store::open_root(root).context("failed to open store")?;
    match subcmd {
        UsageSubcommand::Show { user_id, day } => {
            let day: UsageDay = match day {
                Some(d) => d.parse()?,
                None => UsageDay::today(),
            };
            let tier = store.read_tier(&user_id)?;
            let mut actions: BTreeSet<String> = config.usage.daily_limits.keys().cloned().collect();
            actions.extend(store.usage_for(&user_id, day)?.into_iter().map(|(a, _)| a));

            let meter = UsageMeter::new(&store);
            let mut quotas = Vec::new();
            for action in actions {
                let limit = config.usage.limit_for(tier, &action);
                let quota = meter.peek(&user_id, &action, limit, day)?;
                quotas.push((action, quota));
            }

            if json {
                let items: Vec<serde_json::Value> = quotas
                    .iter()
                    .map(|(action, q)| serde_json::json!({ "action": action, "quota": q }))
                    .collect();
                return print_json(&serde_json::json!({
                    "user_id": user_id,
                    "tier": tier,
                    "day": day,
                    "actions": items,
                }));
            }
            println!("{user_id} ({tier}) on {day}");
            let rows: Vec<Vec<String>> = quotas
                .iter()
                .map(|(action, q)| {
                    vec![
                        action.clone(),
                        q.used.to_string(),
                        show_limit(q.limit),
                        show_limit(q.remaining),
                    ]
                })
                .collect();
            print_table(&["ACTION", "USED", "LIMIT", "REMAINING"], &rows);
        }
        UsageSubcommand::Consume { user_id, action } => {
            let tier = store.read_tier(&user_id)?;
            let limit = config.usage.limit_for(tier, &action);
            let quota = UsageMeter::new(&store).try_consume(&user_id, &action, limit, UsageDay::today())?;
            if json {
                print_json(&quota)?;
            } else {
                print_quota(&action, &quota);
            }
            if !quota.allowed {
                anyhow::bail!("daily limit reached for '{action}'");
            }
        }
    }
    Ok(())
}

fn show_limit(v: Option<u32>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "unlimited".into())
}

fn print_quota(action: &str, q: &Quota) {
    if q.allowed {
        println!("{action}: used {} (remaining {})", q.used, show_limit(q.remaining));
    } else {
        println!("{action}: denied, limit {} reached", show_limit(q.limit));
    }
}
