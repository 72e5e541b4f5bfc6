pub mod coach;
pub mod error;
pub mod mailer;
pub mod payments;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Secrets};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/config", get(routes::config::get_config))
        // Accounts
        .route("/api/accounts", post(routes::accounts::create_account))
        .route("/api/accounts/{user_id}", get(routes::accounts::get_account))
        .route(
            "/api/accounts/{user_id}/history",
            get(routes::accounts::get_history),
        )
        // Entitlements / usage
        .route(
            "/api/entitlements/{user_id}",
            get(routes::entitlements::list_entitlements),
        )
        .route(
            "/api/entitlements/{user_id}/{feature}",
            get(routes::entitlements::check_entitlement),
        )
        .route(
            "/api/usage/{user_id}/{action}",
            get(routes::usage::peek_usage),
        )
        // Payments
        .route("/api/checkout", post(routes::checkout::create_checkout))
        .route(
            "/api/webhooks/payment",
            post(routes::webhook::payment_webhook),
        )
        // Coaching / email
        .route("/api/chat", post(routes::chat::chat))
        .route("/api/email", post(routes::email::send_email))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server on `0.0.0.0:{port}`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}

/// Start the API server on a pre-bound listener.
///
/// Lets the caller read the actual port first when binding to port 0.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("tierline API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
