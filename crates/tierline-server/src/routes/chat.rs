use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tierline_core::coach::ChatMessage;
use tierline_core::entitlement::{Decision, PaywallSignal};
use tierline_core::ledger::TierLedger;
use tierline_core::meter::{Quota, UsageDay, UsageMeter};
use tierline_core::tier::Tier;

use crate::coach;
use crate::error::{json_body, AppError};
use crate::state::AppState;

/// Feature gate and metered action for coaching chat.
pub const CHAT: &str = "chat";

#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// POST /api/chat: gate, charge one unit, then reply.
///
/// The tier is re-read from the ledger on every message. A denied request
/// answers 402 with the paywall signal and does not touch the counter.
pub async fn chat(
    State(app): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = json_body(body)?;
    let user_id = body
        .user_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("missing required field 'user_id'"))?;
    let message = body
        .message
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing required field 'message'"))?;

    let store = app.store.clone();
    let config = app.config.clone();
    let uid = user_id.clone();
    let admitted = tokio::task::spawn_blocking(move || {
        let snapshot = store.read_snapshot(&uid)?;
        if let Decision::Denied(signal) = config.features.decide(&snapshot, CHAT) {
            return Ok::<_, tierline_core::TierlineError>(Err((snapshot.tier, signal)));
        }
        let limit = config.usage.limit_for(snapshot.tier, CHAT);
        let quota = UsageMeter::new(&*store).try_consume(&uid, CHAT, limit, UsageDay::today())?;
        match quota.paywall_signal(CHAT) {
            Some(signal) => Ok(Err((snapshot.tier, signal))),
            None => Ok(Ok((snapshot.tier, quota))),
        }
    })
    .await
    .map_err(AppError::join)??;

    let (tier, quota): (Tier, Quota) = match admitted {
        Ok(admitted) => admitted,
        Err((tier, signal)) => return Ok(paywall(&user_id, tier, signal)),
    };

    let answer = coach::reply(
        &app.http_client,
        &app.config.providers,
        app.secrets.ai_api_key.as_deref(),
        &body.history,
        &message,
    )
    .await;

    Ok(Json(serde_json::json!({
        "reply": answer.reply,
        "source": answer.source,
        "tier": tier,
        "used": quota.used,
        "remaining": quota.remaining,
        "limit": quota.limit,
    }))
    .into_response())
}

fn paywall(user_id: &str, tier: Tier, signal: PaywallSignal) -> Response {
    tracing::info!(user_id, %tier, ?signal, "chat blocked by paywall");
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(serde_json::json!({
            "error": "upgrade required",
            "tier": tier,
            "paywall": signal,
        })),
    )
        .into_response()
}
