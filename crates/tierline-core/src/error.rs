use thiserror::Error;

use crate::tier::Tier;

#[derive(Debug, Error)]
pub enum TierlineError {
    #[error("not initialized: run 'tierline init'")]
    NotInitialized,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("invalid user id '{0}': must be 1-128 chars of [A-Za-z0-9_.@:-]")]
    InvalidUserId(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("tier '{0}' cannot be purchased")]
    TierNotPurchasable(Tier),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("malformed payment event: {0}")]
    MalformedEvent(String),

    #[error("payment for session {session_id} does not resolve to a known account")]
    IdentityUnresolved { session_id: String },

    #[error("no price configured for tier '{0}'")]
    PriceMissing(Tier),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TierlineError>;
