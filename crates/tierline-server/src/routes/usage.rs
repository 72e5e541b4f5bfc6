use axum::extract::{Path, State};
use axum::Json;
use tierline_core::ledger::TierLedger;
use tierline_core::meter::{UsageDay, UsageMeter};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/usage/{user_id}/{action}: today's quota without charging.
pub async fn peek_usage(
    State(app): State<AppState>,
    Path((user_id, action)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let config = app.config.clone();
    let result = tokio::task::spawn_blocking(move || {
        let tier = store.read_tier(&user_id)?;
        let day = UsageDay::today();
        let limit = config.usage.limit_for(tier, &action);
        let quota = UsageMeter::new(&*store).peek(&user_id, &action, limit, day)?;
        Ok::<_, tierline_core::TierlineError>(serde_json::json!({
            "action": action,
            "day": day,
            "tier": tier,
            "allowed": quota.allowed,
            "used": quota.used,
            "remaining": quota.remaining,
            "limit": quota.limit,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
