use crate::error::{Result, TierlineError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TIERLINE_DIR: &str = ".tierline";
pub const CONFIG_FILE: &str = ".tierline/config.yaml";
pub const STORE_FILE: &str = ".tierline/tierline.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn tierline_dir(root: &Path) -> PathBuf {
    root.join(TIERLINE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn store_path(root: &Path) -> PathBuf {
    root.join(STORE_FILE)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static USER_ID_RE: OnceLock<Regex> = OnceLock::new();
static FEATURE_RE: OnceLock<Regex> = OnceLock::new();

fn user_id_re() -> &'static Regex {
    USER_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.@:\-]{1,128}$").unwrap())
}

fn feature_re() -> &'static Regex {
    FEATURE_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*$").unwrap())
}

/// User ids become store key segments, so `/` and whitespace are rejected.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if !user_id_re().is_match(user_id) {
        return Err(TierlineError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}

/// Shape check for feature and action keys in config. Whether a key is
/// *known* is decided by the gate table, not here.
pub fn is_valid_key(key: &str) -> bool {
    key.len() <= 64 && feature_re().is_match(key)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_user_ids() {
        for id in ["u1", "auth0:abc123", "jane.doe@example.com", "a-b_c"] {
            validate_user_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_user_ids() {
        let long = "x".repeat(129);
        for id in ["", "has space", "a/b", long.as_str()] {
            assert!(validate_user_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn key_shapes() {
        assert!(is_valid_key("codex"));
        assert!(is_valid_key("black_book-2"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("Vault"));
        assert!(!is_valid_key("-chat"));
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/app");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/app/.tierline/config.yaml")
        );
        assert_eq!(
            store_path(root),
            PathBuf::from("/tmp/app/.tierline/tierline.redb")
        );
    }
}
