use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/config: the public part of the configuration: feature gates,
/// daily allowances and prices. Provider endpoints are not exposed.
pub async fn get_config(State(app): State<AppState>) -> Json<serde_json::Value> {
    let config = &app.config;
    Json(serde_json::json!({
        "project": config.project.name,
        "features": config.features,
        "usage": config.usage,
        "pricing": config.pricing,
    }))
}
