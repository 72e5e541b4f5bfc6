use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Subscription level. Variant order is the entitlement order:
/// `Free < Premium < Elite`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Elite,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[Tier::Free, Tier::Premium, Tier::Elite]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Elite => "elite",
        }
    }

    /// Tiers a checkout session may be opened for.
    pub fn is_purchasable(self) -> bool {
        matches!(self, Tier::Premium | Tier::Elite)
    }

    /// Parse a stored or foreign tier value. Anything unrecognized is the
    /// lowest tier, never an error.
    pub fn lenient(s: &str) -> Tier {
        s.trim().to_ascii_lowercase().parse().unwrap_or(Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::error::TierlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "elite" => Ok(Tier::Elite),
            _ => Err(crate::error::TierlineError::InvalidTier(s.to_string())),
        }
    }
}

/// `deserialize_with` hook for stored account records: an unrecognized tier
/// reads as `Free` instead of failing the whole record.
pub fn deserialize_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tier, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(Tier::lenient(&raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_free_premium_elite() {
        assert!(Tier::Free < Tier::Premium);
        assert!(Tier::Premium < Tier::Elite);
        let mut shuffled = vec![Tier::Elite, Tier::Free, Tier::Premium];
        shuffled.sort();
        assert_eq!(shuffled, Tier::all());
    }

    #[test]
    fn strict_parse_rejects_unknown() {
        assert_eq!("elite".parse::<Tier>().unwrap(), Tier::Elite);
        assert!("gold".parse::<Tier>().is_err());
        assert!("Elite".parse::<Tier>().is_err());
    }

    #[test]
    fn lenient_parse_degrades_to_free() {
        assert_eq!(Tier::lenient(" Premium "), Tier::Premium);
        assert_eq!(Tier::lenient("platinum"), Tier::Free);
        assert_eq!(Tier::lenient(""), Tier::Free);
    }

    #[derive(Deserialize)]
    struct Stored {
        #[serde(deserialize_with = "deserialize_lenient")]
        tier: Tier,
    }

    #[test]
    fn lenient_hook_reads_unknown_tier_as_free() {
        let s: Stored = serde_json::from_str(r#"{"tier":"vip"}"#).unwrap();
        assert_eq!(s.tier, Tier::Free);
        let s: Stored = serde_json::from_str(r#"{"tier":"elite"}"#).unwrap();
        assert_eq!(s.tier, Tier::Elite);
    }

    #[test]
    fn config_deserialize_is_strict() {
        assert!(serde_yaml::from_str::<Tier>("elitee").is_err());
        assert_eq!(serde_yaml::from_str::<Tier>("premium").unwrap(), Tier::Premium);
    }

    #[test]
    fn only_paid_tiers_are_purchasable() {
        assert!(!Tier::Free.is_purchasable());
        assert!(Tier::Premium.is_purchasable());
        assert!(Tier::Elite.is_purchasable());
    }
}
