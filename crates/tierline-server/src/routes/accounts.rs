use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tierline_core::meter::UsageDay;

use crate::error::{json_body, AppError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountBody {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /api/accounts: register an account at the free tier.
pub async fn create_account(
    State(app): State<AppState>,
    body: Result<Json<CreateAccountBody>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let body = json_body(body)?;
    let user_id = body
        .user_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("missing required field 'user_id'"))?;
    let store = app.store.clone();
    let account = tokio::task::spawn_blocking(move || {
        store.create_account(&user_id, body.email.as_deref())
    })
    .await
    .map_err(AppError::join)??;

    Ok((StatusCode::CREATED, Json(serde_json::to_value(&account)?)))
}

/// GET /api/accounts/{user_id}: account with today's usage counters.
pub async fn get_account(
    State(app): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        let account = store.account(&user_id)?;
        let day = UsageDay::today();
        let usage: serde_json::Map<String, serde_json::Value> = store
            .usage_for(&user_id, day)?
            .into_iter()
            .map(|(action, count)| (action, count.into()))
            .collect();
        Ok::<_, tierline_core::TierlineError>(serde_json::json!({
            "user_id": account.user_id,
            "email": account.email,
            "tier": account.tier,
            "overrides": account.overrides,
            "usage": { "day": day, "counts": usage },
            "created_at": account.created_at,
            "updated_at": account.updated_at,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// GET /api/accounts/{user_id}/history: subscription history, oldest first.
pub async fn get_history(
    State(app): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        store.account(&user_id)?;
        let history = store.history(&user_id)?;
        Ok::<_, tierline_core::TierlineError>(serde_json::to_value(history)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
