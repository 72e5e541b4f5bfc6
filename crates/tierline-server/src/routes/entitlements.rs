use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tierline_core::entitlement::Decision;
use tierline_core::ledger::TierLedger;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/entitlements/{user_id}: every configured feature with its
/// decision for this user.
pub async fn list_entitlements(
    State(app): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let snapshot = tokio::task::spawn_blocking(move || store.read_snapshot(&user_id))
        .await
        .map_err(AppError::join)??;

    let features: serde_json::Map<String, serde_json::Value> = app
        .config
        .features
        .iter()
        .map(|(feature, min_tier)| {
            let allowed = app.config.features.is_allowed(&snapshot, feature);
            (
                feature.clone(),
                serde_json::json!({ "allowed": allowed, "min_tier": min_tier }),
            )
        })
        .collect();

    Ok(Json(serde_json::json!({
        "tier": snapshot.tier,
        "features": features,
    })))
}

/// GET /api/entitlements/{user_id}/{feature}: 200 when allowed, 402 with the
/// paywall signal when not. The ledger is re-read on every call.
pub async fn check_entitlement(
    State(app): State<AppState>,
    Path((user_id, feature)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let store = app.store.clone();
    let uid = user_id.clone();
    let snapshot = tokio::task::spawn_blocking(move || store.read_snapshot(&uid))
        .await
        .map_err(AppError::join)??;

    let response = match app.config.features.decide(&snapshot, &feature) {
        Decision::Allowed => Json(serde_json::json!({
            "feature": feature,
            "tier": snapshot.tier,
            "allowed": true,
        }))
        .into_response(),
        Decision::Denied(signal) => {
            tracing::debug!(user_id = %user_id, feature = %feature, "entitlement denied");
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(serde_json::json!({
                    "feature": feature,
                    "tier": snapshot.tier,
                    "allowed": false,
                    "paywall": signal,
                })),
            )
                .into_response()
        }
    };
    Ok(response)
}
