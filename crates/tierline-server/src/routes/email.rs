use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::error::{json_body, AppError};
use crate::mailer::{self, EmailRequest};
use crate::state::AppState;

/// POST /api/email: deliver `{to, subject, html}` through the email provider.
pub async fn send_email(
    State(app): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = json_body(body)?;
    let email = body.validate()?;
    let id = mailer::send(
        &app.http_client,
        &app.config.providers.email_base_url,
        app.secrets.email_api_key.as_deref(),
        &app.config.providers.email_from,
        &email,
    )
    .await?;
    Ok(Json(serde_json::json!({ "sent": true, "id": id })))
}
