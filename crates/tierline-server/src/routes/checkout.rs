use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tierline_core::checkout::CheckoutRequest;
use tierline_core::error::TierlineError;

use crate::error::{json_body, AppError};
use crate::payments;
use crate::state::AppState;

/// POST /api/checkout: open a hosted checkout session for an upgrade.
///
/// The price always comes from server config; the client only names a tier.
/// The payer's account must already exist so the completion event can be
/// matched back to it.
pub async fn create_checkout(
    State(app): State<AppState>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = json_body(body)?;
    let plan = body.validate(&app.config)?;

    let store = app.store.clone();
    let uid = plan.user_id.clone();
    let account = tokio::task::spawn_blocking(move || store.account(&uid))
        .await
        .map_err(AppError::join)??;
    if account.tier >= plan.tier {
        return Err(TierlineError::InvalidRequest(format!(
            "account '{}' already holds tier '{}'",
            account.user_id, account.tier
        ))
        .into());
    }

    let session = payments::create_checkout_session(
        &app.http_client,
        &app.config.providers.payments_base_url,
        app.secrets.payment_secret_key.as_deref(),
        &plan,
        account.email.as_deref(),
    )
    .await?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "url": session.url,
        "tier": plan.tier,
        "amount": plan.price.amount,
        "currency": plan.price.currency,
        "interval": plan.price.interval,
    })))
}
