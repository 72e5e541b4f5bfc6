//! Checkout session creation against a Stripe-compatible payments API.

use serde::{Deserialize, Serialize};
use tierline_core::checkout::CheckoutPlan;

use crate::error::ProviderError;

const PROVIDER: &str = "payments";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: String,
    pub url: String,
}

fn form_fields(plan: &CheckoutPlan, customer_email: Option<&str>) -> Vec<(String, String)> {
    let mut fields = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("success_url".to_string(), plan.success_url.clone()),
        ("cancel_url".to_string(), plan.cancel_url.clone()),
        ("client_reference_id".to_string(), plan.user_id.clone()),
        ("metadata[user_id]".to_string(), plan.user_id.clone()),
        ("metadata[tier]".to_string(), plan.tier.to_string()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            plan.price.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            plan.price.amount.to_string(),
        ),
        (
            "line_items[0][price_data][recurring][interval]".to_string(),
            plan.price.interval.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            format!("{} membership", capitalize(plan.tier.as_str())),
        ),
        (
            "subscription_data[metadata][user_id]".to_string(),
            plan.user_id.clone(),
        ),
    ];
    if let Some(email) = customer_email {
        fields.push(("customer_email".to_string(), email.to_string()));
    }
    fields
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Open a hosted checkout session for `plan`. Identity is attached both as
/// `client_reference_id` and in metadata so the completion event carries it.
pub async fn create_checkout_session(
    client: &reqwest::Client,
    base_url: &str,
    secret_key: Option<&str>,
    plan: &CheckoutPlan,
    customer_email: Option<&str>,
) -> Result<CreatedSession, ProviderError> {
    let secret_key = secret_key
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::NotConfigured(PROVIDER))?;
    let url = format!("{}/v1/checkout/sessions", base_url.trim_end_matches('/'));

    let resp = client
        .post(&url)
        .bearer_auth(secret_key)
        .form(&form_fields(plan, customer_email))
        .send()
        .await
        .map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: status.as_u16(),
            body,
        });
    }

    let session: CreatedSession =
        resp.json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
    tracing::info!(session_id = %session.id, user_id = %plan.user_id, tier = %plan.tier, "checkout session created");
    Ok(session)
}
