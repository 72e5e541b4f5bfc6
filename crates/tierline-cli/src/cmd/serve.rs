use anyhow::Context;
use clap::Args;
use std::path::Path;
use tierline_core::config::{Config, WarnLevel};
use tierline_server::{AppState, Secrets};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (0 = OS-assigned)
    #[arg(long, default_value = "3141")]
    pub port: u16,

    /// Payments provider secret key, used to open checkout sessions
    #[arg(long, env = "PAYMENT_SECRET_KEY", hide_env_values = true)]
    pub payment_secret_key: Option<String>,

    /// Signing secret for payment webhooks
    #[arg(long, env = "PAYMENT_WEBHOOK_SECRET", hide_env_values = true)]
    pub payment_webhook_secret: Option<String>,

    /// AI provider key for coaching chat (fallback replies when unset)
    #[arg(long, env = "AI_API_KEY", hide_env_values = true)]
    pub ai_api_key: Option<String>,

    /// Email provider key for the transactional email endpoint
    #[arg(long, env = "EMAIL_API_KEY", hide_env_values = true)]
    pub email_api_key: Option<String>,
}

pub fn run(root: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let mut has_errors = false;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => {
                tracing::error!("config: {}", w.message);
                has_errors = true;
            }
        }
    }
    if has_errors {
        anyhow::bail!("config has errors; run `tierline config validate`");
    }

    let secrets = Secrets {
        payment_secret_key: args.payment_secret_key,
        payment_webhook_secret: args.payment_webhook_secret,
        ai_api_key: args.ai_api_key,
        email_api_key: args.email_api_key,
    };
    if secrets.payment_webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET is not set; every payment webhook will be rejected");
    }
    if secrets.ai_api_key.is_none() {
        tracing::info!("AI_API_KEY is not set; chat will use fallback replies");
    }

    let state = AppState::open(root.to_path_buf(), secrets).context("failed to open project")?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(tierline_server::serve(state, args.port))
}
