use std::path::PathBuf;
use std::sync::Arc;

use tierline_core::config::Config;
use tierline_core::db::Store;

/// Server-side credentials. Read from the environment by the CLI and never
/// written to the config file or returned by any endpoint.
#[derive(Clone, Default)]
pub struct Secrets {
    pub payment_secret_key: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub ai_api_key: Option<String>,
    pub email_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn shown(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Secrets")
            .field("payment_secret_key", &shown(&self.payment_secret_key))
            .field("payment_webhook_secret", &shown(&self.payment_webhook_secret))
            .field("ai_api_key", &shown(&self.ai_api_key))
            .field("email_api_key", &shown(&self.email_api_key))
            .finish()
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub secrets: Arc<Secrets>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(root: PathBuf, config: Config, store: Store, secrets: Secrets) -> Self {
        Self {
            root,
            config: Arc::new(config),
            store: Arc::new(store),
            secrets: Arc::new(secrets),
            http_client: reqwest::Client::new(),
        }
    }

    /// Load config and open the store of an initialized project.
    pub fn open(root: PathBuf, secrets: Secrets) -> tierline_core::Result<Self> {
        let config = Config::load(&root)?;
        let store = Store::open_root(&root)?;
        Ok(Self::new(root, config, store, secrets))
    }
}
