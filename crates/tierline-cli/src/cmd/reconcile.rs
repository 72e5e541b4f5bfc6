use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use tierline_core::config::Config;
use tierline_core::db::Store;
use tierline_core::reconcile::{Outcome, PaymentEvent, Reconciler};

/// Apply a saved `checkout.session.completed` event by hand, for payments
/// the webhook could not attribute. The file is trusted: no signature check.
/// `user_id` replaces whatever identity the event carries.
pub fn run(root: &Path, event_file: &Path, user_id: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = Store::open_root(root).context("failed to open store")?;
    let raw = std::fs::read(event_file)
        .with_context(|| format!("failed to read {}", event_file.display()))?;
    let event = PaymentEvent::parse(&raw)?;
    if !event.is_checkout_completed() {
        anyhow::bail!("event {} is '{}', not a completed checkout", event.id, event.kind);
    }

    let mut session = event.checkout_session()?;
    if let Some(uid) = user_id {
        session.user_id = Some(uid.to_string());
    }
    let policy = config.reconcile.policy();
    let outcome = Reconciler::new(&store, &*policy).reconcile(&event.id, event.created_at(), &session)?;

    let (label, receipt) = match outcome {
        Outcome::Reconciled(r) => ("reconciled", r),
        Outcome::Duplicate(r) => ("already processed", r),
        Outcome::Ignored { reason } => {
            println!("ignored: {reason}");
            return Ok(());
        }
    };
    if json {
        return print_json(&serde_json::json!({ "outcome": label, "receipt": receipt }));
    }
    println!(
        "{label}: {} -> {} (paid {}, {} {})",
        receipt.user_id, receipt.tier_after, receipt.paid_tier, receipt.amount, receipt.currency
    );
    Ok(())
}
