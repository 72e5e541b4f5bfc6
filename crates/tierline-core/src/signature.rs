//! Payment webhook authentication.
//!
//! The provider signs `"{timestamp}.{raw body}"` with HMAC-SHA256 using the
//! endpoint's signing secret and sends `t=<unix secs>,v1=<hex digest>` in the
//! signature header. More than one `v1` entry may be present while a secret
//! is being rolled.

use crate::error::{Result, TierlineError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((k, v)) = part.trim().split_once('=') else {
            return Err(TierlineError::InvalidSignature("malformed header".into()));
        };
        match k {
            "t" => {
                timestamp = Some(v.parse::<i64>().map_err(|_| {
                    TierlineError::InvalidSignature("timestamp is not an integer".into())
                })?)
            }
            "v1" => signatures.push(v),
            _ => {}
        }
    }
    let timestamp =
        timestamp.ok_or_else(|| TierlineError::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(TierlineError::InvalidSignature("missing v1 signature".into()));
    }
    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key of any size"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Verify a signed webhook body. `now` is unix seconds.
///
/// Fails on a missing or malformed header, a timestamp outside
/// `tolerance_secs` of `now`, or when no `v1` entry matches.
pub fn verify(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    if secret.is_empty() {
        return Err(TierlineError::InvalidSignature(
            "webhook signing secret is not configured".into(),
        ));
    }
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TierlineError::InvalidSignature("missing signature header".into()))?;
    let parsed = parse_header(header)?;

    // A negative tolerance admits nothing.
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    let skew = now.checked_sub(parsed.timestamp).map(i64::unsigned_abs);
    if !matches!(skew, Some(skew) if skew <= tolerance) {
        return Err(TierlineError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    let matched = parsed.signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        mac_for(secret, parsed.timestamp, payload)
            .verify_slice(&expected)
            .is_ok()
    });
    if !matched {
        return Err(TierlineError::InvalidSignature("signature mismatch".into()));
    }
    Ok(())
}

/// Produce a signature header for `payload`, as the provider would.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = mac_for(secret, timestamp, payload).finalize().into_bytes();
    format!("t={timestamp},v1={}", hex::encode(digest))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_760_000_000;
    const BODY: &[u8] = br#"{"type":"checkout.session.completed"}"#;

    #[test]
    fn valid_signature_accepted() {
        let header = sign(BODY, SECRET, NOW);
        verify(BODY, Some(&header), SECRET, 300, NOW).unwrap();
    }

    #[test]
    fn wrong_secret_rejected() {
        let header = sign(BODY, "wrong_secret", NOW);
        assert!(verify(BODY, Some(&header), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn modified_payload_rejected() {
        let header = sign(BODY, SECRET, NOW);
        let tampered = br#"{"type":"checkout.session.completed","hacked":true}"#;
        assert!(verify(tampered, Some(&header), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let header = sign(BODY, SECRET, NOW - 600);
        let err = verify(BODY, Some(&header), SECRET, 300, NOW).unwrap_err();
        assert!(err.to_string().contains("tolerance"), "{err}");
    }

    #[test]
    fn extreme_timestamps_rejected() {
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={t},v1=deadbeef");
            let err = verify(BODY, Some(&header), SECRET, 300, NOW).unwrap_err();
            assert!(err.to_string().contains("tolerance"), "{t}: {err}");
        }
        let header = sign(BODY, SECRET, i64::MIN);
        assert!(verify(BODY, Some(&header), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn negative_tolerance_rejects_fresh_signature() {
        let header = sign(BODY, SECRET, NOW - 1);
        assert!(verify(BODY, Some(&header), SECRET, -1, NOW).is_err());
        let exact = sign(BODY, SECRET, NOW);
        assert!(verify(BODY, Some(&exact), SECRET, -1, NOW).is_err());
    }

    #[test]
    fn missing_header_rejected() {
        assert!(verify(BODY, None, SECRET, 300, NOW).is_err());
        assert!(verify(BODY, Some("  "), SECRET, 300, NOW).is_err());
    }

    #[test]
    fn malformed_headers_rejected() {
        for header in ["garbage", "v1=abcd", "t=1760000000", "t=soon,v1=abcd"] {
            assert!(
                verify(BODY, Some(header), SECRET, 300, NOW).is_err(),
                "expected rejection: {header}"
            );
        }
    }

    #[test]
    fn any_matching_v1_accepted() {
        let good = sign(BODY, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig}");
        verify(BODY, Some(&header), SECRET, 300, NOW).unwrap();
    }

    #[test]
    fn empty_secret_never_verifies() {
        let header = sign(BODY, "", NOW);
        assert!(verify(BODY, Some(&header), "", 300, NOW).is_err());
    }
}
