use crate::checkout::Price;
use crate::entitlement::FeatureGates;
use crate::error::{Result, TierlineError};
use crate::meter::UsagePolicy;
use crate::paths;
use crate::reconcile::{AmountPolicy, AmountThresholds, PriceIdPolicy, TierPolicy};
use crate::tier::Tier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ReconcileConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStrategy {
    /// Infer the tier from the amount actually paid.
    #[default]
    Amount,
    /// Map the catalog price id to a tier, falling back to the amount.
    PriceId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub strategy: TierStrategy,
    #[serde(default)]
    pub thresholds: AmountThresholds,
    /// Currency the thresholds are denominated in.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub price_ids: BTreeMap<String, Tier>,
    /// Maximum age of a signed webhook timestamp.
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_signature_tolerance() -> i64 {
    300
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: TierStrategy::default(),
            thresholds: AmountThresholds::default(),
            currency: default_currency(),
            price_ids: BTreeMap::new(),
            signature_tolerance_secs: default_signature_tolerance(),
        }
    }
}

impl ReconcileConfig {
    pub fn policy(&self) -> Box<dyn TierPolicy + Send + Sync> {
        let amounts = AmountPolicy::new(self.thresholds, &self.currency);
        match self.strategy {
            TierStrategy::Amount => Box::new(amounts),
            TierStrategy::PriceId => Box::new(PriceIdPolicy {
                prices: self.price_ids.clone(),
                fallback: amounts,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ProvidersConfig
// ---------------------------------------------------------------------------

/// Non-secret endpoints of the external collaborators. API keys come from the
/// environment, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_payments_base_url")]
    pub payments_base_url: String,
    #[serde(default = "default_ai_base_url")]
    pub ai_base_url: String,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,
    #[serde(default = "default_email_base_url")]
    pub email_base_url: String,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

fn default_payments_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_timeout() -> u64 {
    20
}

fn default_email_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_email_from() -> String {
    "Coach <coach@localhost>".to_string()
}

fn default_success_url() -> String {
    "http://localhost:5173/success?session_id={CHECKOUT_SESSION_ID}".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:5173/pricing".to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            payments_base_url: default_payments_base_url(),
            ai_base_url: default_ai_base_url(),
            ai_model: default_ai_model(),
            ai_timeout_secs: default_ai_timeout(),
            email_base_url: default_email_base_url(),
            email_from: default_email_from(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub features: FeatureGates,
    #[serde(default)]
    pub usage: UsagePolicy,
    #[serde(default = "default_pricing")]
    pub pricing: BTreeMap<Tier, Price>,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_version() -> u32 {
    1
}

fn default_pricing() -> BTreeMap<Tier, Price> {
    let mut m = BTreeMap::new();
    m.insert(Tier::Premium, Price::monthly(1999, "usd"));
    m.insert(Tier::Elite, Price::monthly(4999, "usd"));
    m
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            features: FeatureGates::default(),
            usage: UsagePolicy::default(),
            pricing: default_pricing(),
            reconcile: ReconcileConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }

    pub fn price_for(&self, tier: Tier) -> Result<&Price> {
        if !tier.is_purchasable() {
            return Err(TierlineError::TierNotPurchasable(tier));
        }
        self.pricing
            .get(&tier)
            .ok_or(TierlineError::PriceMissing(tier))
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(TierlineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        // 1. Feature and action keys must be well-formed.
        for key in self.features.keys() {
            if !paths::is_valid_key(key) {
                push(WarnLevel::Error, format!("invalid feature key '{key}'"));
            }
        }
        for (action, limit) in &self.usage.daily_limits {
            if !paths::is_valid_key(action) {
                push(
                    WarnLevel::Error,
                    format!("invalid action key '{action}' in usage.daily_limits"),
                );
            }
            if *limit == 0 {
                push(
                    WarnLevel::Warning,
                    format!("daily limit for '{action}' is 0: metered tiers can never use it"),
                );
            }
        }
        if !self.features.contains("chat") {
            push(
                WarnLevel::Warning,
                "feature 'chat' is not configured: every chat request will be denied".into(),
            );
        }
        if self.usage.unlimited_from == Tier::Free {
            push(
                WarnLevel::Warning,
                "usage.unlimited_from is 'free': no tier is metered".into(),
            );
        }

        // 2. Thresholds must form a step function.
        let thresholds = self.reconcile.thresholds;
        if thresholds.premium == 0 {
            push(
                WarnLevel::Warning,
                "reconcile.thresholds.premium is 0: any completed payment grants premium".into(),
            );
        }
        if thresholds.elite <= thresholds.premium {
            push(
                WarnLevel::Error,
                format!(
                    "reconcile.thresholds.elite ({}) must be greater than premium ({})",
                    thresholds.elite, thresholds.premium
                ),
            );
        }

        // 3. Every purchasable tier needs a price that reconciles back to it.
        for tier in Tier::all().iter().copied().filter(|t| t.is_purchasable()) {
            match self.pricing.get(&tier) {
                None => push(WarnLevel::Error, format!("no price configured for '{tier}'")),
                Some(price) => {
                    if !price.currency.eq_ignore_ascii_case(&self.reconcile.currency) {
                        push(
                            WarnLevel::Error,
                            format!(
                                "price for '{tier}' is in '{}' but reconcile.currency is '{}'",
                                price.currency, self.reconcile.currency
                            ),
                        );
                    }
                    let inferred = thresholds.tier_for_amount(price.amount);
                    if self.reconcile.strategy == TierStrategy::Amount && inferred != tier {
                        push(
                            WarnLevel::Error,
                            format!(
                                "price for '{tier}' ({} {}) reconciles as '{inferred}' under the amount thresholds",
                                price.amount, price.currency
                            ),
                        );
                    }
                }
            }
        }
        if self.pricing.contains_key(&Tier::Free) {
            push(
                WarnLevel::Warning,
                "pricing entry for 'free' is ignored: free cannot be purchased".into(),
            );
        }

        // 4. Price-id strategy needs a catalog.
        if self.reconcile.strategy == TierStrategy::PriceId && self.reconcile.price_ids.is_empty()
        {
            push(
                WarnLevel::Warning,
                "reconcile.strategy is price_id but reconcile.price_ids is empty; amounts decide"
                    .into(),
            );
        }
        if self.reconcile.signature_tolerance_secs <= 0 {
            push(
                WarnLevel::Error,
                "reconcile.signature_tolerance_secs must be positive".into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_clean() {
        let cfg = Config::new("coach");
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("coach");
        cfg.usage.daily_limits.insert("journal".into(), 5);
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "coach");
        assert_eq!(loaded.usage.daily_limits.get("journal"), Some(&5));
        assert_eq!(loaded.price_for(Tier::Elite).unwrap().amount, 4999);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(TierlineError::NotInitialized)
        ));
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("project:\n  name: coach\n").unwrap();
        assert_eq!(cfg.reconcile.signature_tolerance_secs, 300);
        assert_eq!(cfg.usage.unlimited_from, Tier::Premium);
        assert!(cfg.features.contains("blackbook"));
    }

    #[test]
    fn typo_in_feature_tier_fails_to_parse() {
        let yaml = "project:\n  name: coach\nfeatures:\n  vault: premum\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn free_price_not_purchasable() {
        let cfg = Config::new("coach");
        assert!(matches!(
            cfg.price_for(Tier::Free),
            Err(TierlineError::TierNotPurchasable(Tier::Free))
        ));
    }

    #[test]
    fn validate_flags_inverted_thresholds() {
        let mut cfg = Config::new("coach");
        cfg.reconcile.thresholds.elite = cfg.reconcile.thresholds.premium;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("must be greater")));
    }

    #[test]
    fn validate_flags_price_below_its_threshold() {
        let mut cfg = Config::new("coach");
        cfg.pricing.insert(Tier::Elite, Price::monthly(2500, "usd"));
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("reconciles as 'premium'")));
    }

    #[test]
    fn validate_flags_bad_keys_and_missing_chat() {
        let mut cfg = Config::new("coach");
        cfg.features.remove("chat");
        cfg.features.insert("Bad Key", Tier::Free);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("invalid feature key")));
        assert!(warnings.iter().any(|w| w.message.contains("'chat' is not configured")));
    }

    #[test]
    fn validate_rejects_non_positive_signature_tolerance() {
        for tolerance in [0, -1, i64::MIN] {
            let mut cfg = Config::new("coach");
            cfg.reconcile.signature_tolerance_secs = tolerance;
            assert!(
                cfg.validate()
                    .iter()
                    .any(|w| w.level == WarnLevel::Error && w.message.contains("must be positive")),
                "{tolerance}"
            );
        }
    }

    #[test]
    fn validate_flags_price_outside_reconcile_currency() {
        let mut cfg = Config::new("coach");
        cfg.pricing.insert(Tier::Premium, Price::monthly(1999, "eur"));
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("reconcile.currency")));
    }

    #[test]
    fn amount_policy_follows_configured_currency() {
        let mut cfg = Config::new("coach");
        cfg.reconcile.currency = "EUR".into();
        let policy = cfg.reconcile.policy();
        let mut payment = crate::reconcile::PaymentFacts {
            amount_total: 4999,
            currency: "eur".into(),
            price_id: None,
        };
        assert_eq!(policy.tier_for(&payment), Tier::Elite);
        payment.currency = "usd".into();
        assert_eq!(policy.tier_for(&payment), Tier::Free);
    }

    #[test]
    fn price_id_policy_uses_catalog() {
        let mut cfg = Config::new("coach");
        cfg.reconcile.strategy = TierStrategy::PriceId;
        cfg.reconcile.price_ids.insert("price_elite".into(), Tier::Elite);
        let policy = cfg.reconcile.policy();
        let payment = crate::reconcile::PaymentFacts {
            amount_total: 1,
            currency: "usd".into(),
            price_id: Some("price_elite".into()),
        };
        assert_eq!(policy.tier_for(&payment), Tier::Elite);
    }
}
