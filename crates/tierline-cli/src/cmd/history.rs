use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use tierline_core::db::Store;
use tierline_core::meter::UsageDay;

pub fn run(root: &Path, user_id: &str, json: bool) -> anyhow::Result<()> {
    let store = Store::open_root(root).context("failed to open store")?;
    store.account(user_id)?;
    let history = store.history(user_id)?;
    if json {
        return print_json(&history);
    }
    if history.is_empty() {
        println!("No subscription history for {user_id}.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = history
        .iter()
        .map(|h| {
            vec![
                h.period_start.format("%Y-%m-%d").to_string(),
                h.tier.to_string(),
                h.status.to_string(),
                format!("{} {}", h.amount, h.currency),
                h.session_id.clone(),
            ]
        })
        .collect();
    print_table(&["START", "TIER", "STATUS", "AMOUNT", "SESSION"], &rows);
    Ok(())
}

pub fn run_revenue(root: &Path, day: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = Store::open_root(root).context("failed to open store")?;
    let days = match day {
        Some(d) => {
            let day: UsageDay = d.parse()?;
            store.revenue(day)?
        }
        None => store.revenue_all()?,
    };
    if json {
        return print_json(&days);
    }
    if days.is_empty() {
        println!("No revenue recorded.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = days
        .iter()
        .map(|d| {
            vec![
                d.day.format("%Y-%m-%d").to_string(),
                d.currency.clone(),
                d.payments.to_string(),
                d.amount_total.to_string(),
            ]
        })
        .collect();
    print_table(&["DAY", "CURRENCY", "PAYMENTS", "AMOUNT"], &rows);
    Ok(())
}
