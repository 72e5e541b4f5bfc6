use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use tierline_core::error::TierlineError;
use tierline_core::reconcile::{Outcome, PaymentEvent, Reconciler};
use tierline_core::signature::{self, SIGNATURE_HEADER};

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/webhooks/payment: authenticated payment events.
///
/// Responses: 400 when the signature or body is rejected; 200 once the event
/// is reconciled, already processed, ignored, or cannot be matched to an
/// account (`reconciled: false`); 500 on a storage failure so the provider
/// redelivers.
pub async fn payment_webhook(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let secret = app.secrets.payment_webhook_secret.as_deref().unwrap_or("");
    if let Err(e) = signature::verify(
        &body,
        header,
        secret,
        app.config.reconcile.signature_tolerance_secs,
        Utc::now().timestamp(),
    ) {
        tracing::warn!(error = %e, "payment webhook rejected");
        return Err(e.into());
    }

    let event = PaymentEvent::parse(&body)?;
    let event_id = event.id.clone();
    let store = app.store.clone();
    let config = app.config.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let policy = config.reconcile.policy();
        Reconciler::new(&store, &*policy).handle(&event)
    })
    .await
    .map_err(AppError::join)?;

    let body = match outcome {
        Ok(Outcome::Reconciled(receipt)) => serde_json::json!({
            "received": true,
            "reconciled": true,
            "user_id": receipt.user_id,
            "tier": receipt.tier_after,
        }),
        Ok(Outcome::Duplicate(receipt)) => serde_json::json!({
            "received": true,
            "reconciled": true,
            "duplicate": true,
            "user_id": receipt.user_id,
            "tier": receipt.tier_after,
        }),
        Ok(Outcome::Ignored { reason }) => serde_json::json!({
            "received": true,
            "reconciled": false,
            "ignored": reason,
        }),
        Err(e @ TierlineError::IdentityUnresolved { .. }) => {
            tracing::error!(event_id = %event_id, error = %e, "payment could not be attributed");
            serde_json::json!({
                "received": true,
                "reconciled": false,
                "error": e.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(body))
}
