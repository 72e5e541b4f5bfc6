//! Payment-to-entitlement reconciliation.
//!
//! A completed checkout moves through `Created → Completed → Reconciled`.
//! Reconciling resolves the paying account, decides the paid tier through a
//! [`TierPolicy`], and then in a single redb write transaction:
//!
//! 1. rejects the event if its event id or session id was already processed,
//! 2. raises the account tier (never lowers it),
//! 3. appends a subscription history row,
//! 4. adds the amount to the revenue row for its day and currency,
//! 5. records a receipt under both the event id and the session id.
//!
//! Either every write commits or none does, so a provider redelivering the
//! same event is a no-op and a failed attempt can be retried safely.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::{CheckoutSession, CheckoutStatus};
use crate::db::{
    event_key, history_key, normalize_email, revenue_key, session_key, store_err, Store,
    ACCOUNTS, EMAILS, HISTORY, PROCESSED, REVENUE,
};
use crate::error::{Result, TierlineError};
use crate::history::{HistoryEntry, RevenueDay, SubscriptionStatus};
use crate::ledger::Account;
use crate::meter::UsageDay;
use crate::tier::Tier;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

// ---------------------------------------------------------------------------
// Tier policies
// ---------------------------------------------------------------------------

/// What a completed payment tells us, independent of provider shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFacts {
    pub amount_total: u64,
    pub currency: String,
    pub price_id: Option<String>,
}

/// Decides which tier a completed payment buys.
pub trait TierPolicy {
    fn tier_for(&self, payment: &PaymentFacts) -> Tier;
}

/// Step function over the amount paid, in minor units:
/// `[0, premium) → Free`, `[premium, elite) → Premium`, `[elite, ∞) → Elite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountThresholds {
    pub premium: u64,
    pub elite: u64,
}

impl Default for AmountThresholds {
    fn default() -> Self {
        Self {
            premium: 1999,
            elite: 4999,
        }
    }
}

impl AmountThresholds {
    pub fn tier_for_amount(&self, amount: u64) -> Tier {
        if amount >= self.elite {
            Tier::Elite
        } else if amount >= self.premium {
            Tier::Premium
        } else {
            Tier::Free
        }
    }
}

/// Thresholds apply only to amounts in the pricing currency. A payment in
/// any other currency buys `Free`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountPolicy {
    pub thresholds: AmountThresholds,
    pub currency: String,
}

impl AmountPolicy {
    pub fn new(thresholds: AmountThresholds, currency: &str) -> Self {
        Self {
            thresholds,
            currency: currency.trim().to_ascii_lowercase(),
        }
    }
}

impl TierPolicy for AmountPolicy {
    fn tier_for(&self, payment: &PaymentFacts) -> Tier {
        if !payment.currency.eq_ignore_ascii_case(&self.currency) {
            tracing::warn!(
                currency = %payment.currency,
                expected = %self.currency,
                amount = payment.amount_total,
                "payment currency does not match pricing; no tier inferred from amount"
            );
            return Tier::Free;
        }
        self.thresholds.tier_for_amount(payment.amount_total)
    }
}

/// Catalog lookup by price id; unknown or absent ids fall back to amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceIdPolicy {
    pub prices: BTreeMap<String, Tier>,
    pub fallback: AmountPolicy,
}

impl TierPolicy for PriceIdPolicy {
    fn tier_for(&self, payment: &PaymentFacts) -> Tier {
        payment
            .price_id
            .as_deref()
            .and_then(|id| self.prices.get(id).copied())
            .unwrap_or_else(|| self.fallback.tier_for(payment))
    }
}

// ---------------------------------------------------------------------------
// Provider events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix seconds.
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    amount_total: Option<u64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

fn present(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PaymentEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| TierlineError::MalformedEvent(e.to_string()))
    }

    pub fn is_checkout_completed(&self) -> bool {
        self.kind == CHECKOUT_COMPLETED
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created, 0).unwrap_or_else(Utc::now)
    }

    /// Provider-reported payment status of the session, if any.
    pub fn payment_status(&self) -> Option<&str> {
        self.data.object.get("payment_status")?.as_str()
    }

    /// Extract the completed checkout session. Explicit identity comes from
    /// `metadata.user_id`, then `client_reference_id`; the payer email from
    /// `customer_details.email`, then `customer_email`.
    pub fn checkout_session(&self) -> Result<CheckoutSession> {
        let obj: SessionObject = serde_json::from_value(self.data.object.clone())
            .map_err(|e| TierlineError::MalformedEvent(e.to_string()))?;
        let mut metadata = obj.metadata.unwrap_or_default();
        let user_id = present(metadata.remove("user_id")).or(present(obj.client_reference_id));
        let email = present(obj.customer_details.and_then(|d| d.email))
            .or(present(obj.customer_email));
        let requested_tier = metadata
            .remove("tier")
            .and_then(|t| t.trim().to_ascii_lowercase().parse().ok());
        Ok(CheckoutSession {
            session_id: obj.id,
            user_id,
            email,
            requested_tier,
            price_id: present(metadata.remove("price_id")),
            amount_total: obj.amount_total.unwrap_or(0),
            currency: obj.currency.unwrap_or_default().to_ascii_lowercase(),
            status: CheckoutStatus::Completed,
        })
    }
}

// ---------------------------------------------------------------------------
// Outcome / receipt
// ---------------------------------------------------------------------------

/// Durable record of a reconciled payment, stored under both its event id
/// and its session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReceipt {
    pub event_id: String,
    pub session_id: String,
    pub user_id: String,
    pub paid_tier: Tier,
    pub tier_before: Tier,
    pub tier_after: Tier,
    pub amount: u64,
    pub currency: String,
    pub history_id: Uuid,
    pub status: CheckoutStatus,
    pub reconciled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reconciled(ReconciliationReceipt),
    /// The event or its session was processed before; nothing changed.
    Duplicate(ReconciliationReceipt),
    /// Authenticated but not something we act on.
    Ignored { reason: String },
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a> {
    store: &'a Store,
    policy: &'a dyn TierPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store, policy: &'a dyn TierPolicy) -> Self {
        Self { store, policy }
    }

    /// Handle an already-authenticated provider event.
    pub fn handle(&self, event: &PaymentEvent) -> Result<Outcome> {
        if !event.is_checkout_completed() {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "ignoring event type");
            return Ok(Outcome::Ignored {
                reason: format!("unhandled event type '{}'", event.kind),
            });
        }
        if event.payment_status() == Some("unpaid") {
            tracing::info!(event_id = %event.id, "checkout completed without settled payment");
            return Ok(Outcome::Ignored {
                reason: "payment not settled".into(),
            });
        }
        let session = event.checkout_session()?;
        self.reconcile(&event.id, event.created_at(), &session)
    }

    /// Apply one completed session. See the module docs for the write set.
    pub fn reconcile(
        &self,
        event_id: &str,
        period_start: DateTime<Utc>,
        session: &CheckoutSession,
    ) -> Result<Outcome> {
        let facts = PaymentFacts {
            amount_total: session.amount_total,
            currency: session.currency.clone(),
            price_id: session.price_id.clone(),
        };
        let paid_tier = self.policy.tier_for(&facts);
        if let Some(requested) = session.requested_tier.filter(|t| *t != paid_tier) {
            tracing::warn!(
                session_id = %session.session_id,
                %requested,
                paid = %paid_tier,
                "payment does not match the tier requested at checkout"
            );
        }
        let now = Utc::now();
        let ev_key = event_key(event_id);
        let sess_key = session_key(&session.session_id);

        let wt = self.store.db.begin_write().map_err(store_err)?;
        let receipt = {
            let mut processed = wt.open_table(PROCESSED).map_err(store_err)?;
            for key in [ev_key.as_str(), sess_key.as_str()] {
                let seen = processed
                    .get(key)
                    .map_err(store_err)?
                    .map(|g| g.value().to_vec());
                if let Some(raw) = seen {
                    let receipt: ReconciliationReceipt = serde_json::from_slice(&raw)?;
                    tracing::info!(event_id, session_id = %session.session_id, "duplicate payment event");
                    return Ok(Outcome::Duplicate(receipt));
                }
            }

            // Identity: explicit reference first, payer email second.
            let mut accounts = wt.open_table(ACCOUNTS).map_err(store_err)?;
            let emails = wt.open_table(EMAILS).map_err(store_err)?;
            let mut resolved: Option<Vec<u8>> = None;
            if let Some(ref uid) = session.user_id {
                resolved = accounts
                    .get(uid.as_str())
                    .map_err(store_err)?
                    .map(|g| g.value().to_vec());
                if resolved.is_none() {
                    tracing::warn!(user_id = %uid, session_id = %session.session_id, "explicit payer identity is not a known account");
                }
            }
            if resolved.is_none() {
                if let Some(ref email) = session.email {
                    let uid = emails
                        .get(normalize_email(email).as_str())
                        .map_err(store_err)?
                        .map(|g| g.value().to_string());
                    if let Some(uid) = uid {
                        resolved = accounts
                            .get(uid.as_str())
                            .map_err(store_err)?
                            .map(|g| g.value().to_vec());
                    }
                }
            }
            let Some(raw) = resolved else {
                tracing::error!(
                    event_id,
                    session_id = %session.session_id,
                    "payment does not resolve to a known account"
                );
                return Err(TierlineError::IdentityUnresolved {
                    session_id: session.session_id.clone(),
                });
            };
            let mut account: Account = serde_json::from_slice(&raw)?;

            // Tier ledger: upgrades only.
            let tier_before = account.tier;
            account.tier = tier_before.max(paid_tier);
            account.updated_at = now;
            let value = serde_json::to_vec(&account)?;
            accounts
                .insert(account.user_id.as_str(), value.as_slice())
                .map_err(store_err)?;
            if paid_tier < tier_before {
                tracing::warn!(
                    user_id = %account.user_id,
                    paid = %paid_tier,
                    held = %tier_before,
                    "payment buys less than the tier already held; tier kept"
                );
            }

            // Subscription history: append-only.
            let entry = HistoryEntry {
                id: Uuid::new_v4(),
                user_id: account.user_id.clone(),
                tier: paid_tier,
                status: SubscriptionStatus::Active,
                amount: session.amount_total,
                currency: session.currency.clone(),
                period_start,
                session_id: session.session_id.clone(),
                event_id: event_id.to_string(),
                recorded_at: now,
            };
            let mut history = wt.open_table(HISTORY).map_err(store_err)?;
            let hkey = history_key(&entry);
            history
                .insert(hkey.as_str(), serde_json::to_vec(&entry)?.as_slice())
                .map_err(store_err)?;

            // Revenue per day and currency: incremented inside this transaction.
            let day = period_start.date_naive();
            let rkey = revenue_key(UsageDay::from_date(day), &session.currency);
            let mut revenue = wt.open_table(REVENUE).map_err(store_err)?;
            let existing = revenue
                .get(rkey.as_str())
                .map_err(store_err)?
                .map(|g| g.value().to_vec());
            let mut row = match existing {
                Some(raw) => serde_json::from_slice::<RevenueDay>(&raw)?,
                None => RevenueDay::empty(day, &session.currency),
            };
            row.add(session.amount_total);
            revenue
                .insert(rkey.as_str(), serde_json::to_vec(&row)?.as_slice())
                .map_err(store_err)?;

            let receipt = ReconciliationReceipt {
                event_id: event_id.to_string(),
                session_id: session.session_id.clone(),
                user_id: account.user_id.clone(),
                paid_tier,
                tier_before,
                tier_after: account.tier,
                amount: session.amount_total,
                currency: session.currency.clone(),
                history_id: entry.id,
                status: CheckoutStatus::Reconciled,
                reconciled_at: now,
            };
            let receipt_value = serde_json::to_vec(&receipt)?;
            processed
                .insert(ev_key.as_str(), receipt_value.as_slice())
                .map_err(store_err)?;
            processed
                .insert(sess_key.as_str(), receipt_value.as_slice())
                .map_err(store_err)?;
            receipt
        };
        wt.commit().map_err(store_err)?;

        tracing::info!(
            event_id,
            user_id = %receipt.user_id,
            paid = %receipt.paid_tier,
            tier = %receipt.tier_after,
            amount = receipt.amount,
            "payment reconciled"
        );
        Ok(Outcome::Reconciled(receipt))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
