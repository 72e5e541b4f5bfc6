use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tierline_core::error::TierlineError;

// ---------------------------------------------------------------------------
// ProviderError: failures talking to payments, email or AI upstreams
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unexpected response: {detail}")]
    InvalidResponse {
        provider: &'static str,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(TierlineError::InvalidRequest(msg.into()).into())
    }

    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }
}

/// Unwrap a JSON body. Every rejection (bad syntax, wrong field types,
/// missing content type) is a 400 like any other validation failure.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn status_for(e: &TierlineError) -> StatusCode {
    match e {
        TierlineError::AccountNotFound(_) | TierlineError::UnknownFeature(_) => {
            StatusCode::NOT_FOUND
        }
        TierlineError::AccountExists(_) | TierlineError::EmailTaken(_) => StatusCode::CONFLICT,
        TierlineError::InvalidUserId(_)
        | TierlineError::InvalidTier(_)
        | TierlineError::TierNotPurchasable(_)
        | TierlineError::InvalidRequest(_)
        | TierlineError::InvalidSignature(_)
        | TierlineError::MalformedEvent(_) => StatusCode::BAD_REQUEST,
        TierlineError::IdentityUnresolved { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TierlineError::NotInitialized
        | TierlineError::PriceMissing(_)
        | TierlineError::Store(_)
        | TierlineError::Io(_)
        | TierlineError::Yaml(_)
        | TierlineError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if let Some(e) = self.0.downcast_ref::<TierlineError>() {
            status_for(e)
        } else if let Some(e) = self.0.downcast_ref::<ProviderError>() {
            match e {
                ProviderError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
