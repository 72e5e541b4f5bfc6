use crate::output::{print_fields, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::Path;
use tierline_core::db::Store;
use tierline_core::meter::UsageDay;

#[derive(Subcommand)]
pub enum AccountSubcommand {
    /// Register an account at the free tier
    Create {
        user_id: String,
        /// Email used to match payments that carry no account reference
        #[arg(long)]
        email: Option<String>,
    },

    /// Show an account with today's usage
    Show { user_id: String },

    /// List all accounts
    List,
}

pub fn run(root: &Path, subcmd: AccountSubcommand, json: bool) -> anyhow::Result<()> {
    let store = Store::open_root(root).context("failed to open store")?;
    match subcmd {
        AccountSubcommand::Create { user_id, email } => {
            let account = store.create_account(&user_id, email.as_deref())?;
            if json {
                print_json(&account)?;
            } else {
                println!("Created account '{}' at tier {}", account.user_id, account.tier);
            }
        }
        AccountSubcommand::Show { user_id } => {
            let account = store.account(&user_id)?;
            let day = UsageDay::today();
            let counts: BTreeMap<String, u32> = store.usage_for(&user_id, day)?.into_iter().collect();
            if json {
                print_json(&serde_json::json!({
                    "account": account,
                    "usage": { "day": day, "counts": counts },
                }))?;
                return Ok(());
            }
            let overrides: Vec<&str> = account
                .overrides
                .iter()
                .filter(|(_, granted)| **granted)
                .map(|(f, _)| f.as_str())
                .collect();
            let usage: Vec<String> = counts.iter().map(|(a, n)| format!("{a}={n}")).collect();
            print_fields(&[
                ("user", account.user_id.clone()),
                ("email", account.email.clone().unwrap_or_else(|| "-".into())),
                ("tier", account.tier.to_string()),
                ("overrides", join_or_dash(&overrides, ", ")),
                ("usage", format!("{day} {}", join_or_dash(&usage, " "))),
                ("created", account.created_at.format("%Y-%m-%d %H:%M").to_string()),
                ("updated", account.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ]);
        }
        AccountSubcommand::List => {
            let accounts = store.list_accounts()?;
            if json {
                print_json(&accounts)?;
                return Ok(());
            }
            if accounts.is_empty() {
                println!("No accounts.");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = accounts
                .iter()
                .map(|a| {
                    vec![
                        a.user_id.clone(),
                        a.tier.to_string(),
                        a.email.clone().unwrap_or_else(|| "-".into()),
                    ]
                })
                .collect();
            print_table(&["USER", "TIER", "EMAIL"], &rows);
        }
    }
    Ok(())
}

fn join_or_dash<S: AsRef<str>>(items: &[S], sep: &str) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(sep)
}
