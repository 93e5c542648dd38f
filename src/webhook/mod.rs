mod events;

pub use events::*;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a timestamp/token pair the way Mailgun does: hex HMAC-SHA256 of `timestamp || token`
pub fn sign(signing_key: &str, token: &str, timestamp: &str) -> Result<String> {
    let mac = mac_for(signing_key, token, timestamp).context("Invalid HMAC key")?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Mailgun webhook signature.
///
/// Returns false for empty inputs, malformed hex or any mismatch. The digest
/// comparison is constant-time.
pub fn verify(signing_key: &str, token: &str, timestamp: &str, signature: &str) -> bool {
    if token.is_empty() || timestamp.is_empty() || signature.is_empty() {
        tracing::warn!(
            has_token = !token.is_empty(),
            has_timestamp = !timestamp.is_empty(),
            has_signature = !signature.is_empty(),
            "webhook signature fields missing"
        );
        return false;
    }

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    match mac_for(signing_key, token, timestamp) {
        Some(mac) => mac.verify_slice(&expected).is_ok(),
        None => false,
    }
}

fn mac_for(signing_key: &str, token: &str, timestamp: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    Some(mac)
}

/// Signature check configured for one provider account
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    signing_key: String,
    /// Maximum distance between the webhook timestamp and now; 0 disables the check
    max_age_secs: u64,
}

impl SignatureVerifier {
    pub fn new(signing_key: impl Into<String>, max_age_secs: u64) -> Self {
        Self {
            signing_key: signing_key.into(),
            max_age_secs,
        }
    }

    /// Check freshness and signature of a webhook call
    pub fn check(
        &self,
        token: &str,
        timestamp: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if self.max_age_secs > 0 {
            let Ok(ts) = timestamp.parse::<i64>() else {
                tracing::warn!(timestamp = %timestamp, "webhook timestamp is not an integer");
                return false;
            };
            let age = (now.timestamp() - ts).unsigned_abs();
            if age > self.max_age_secs {
                tracing::warn!(
                    age_secs = age,
                    max_age_secs = self.max_age_secs,
                    "webhook timestamp stale"
                );
                return false;
            }
        }

        verify(&self.signing_key, token, timestamp, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "key-3ax6xnjp29jd6fds4gc373sgvjxteol0";

    #[test]
    fn test_sign_covers_timestamp_then_token() {
        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(b"1529006854a8ce0edb2dd8301dee6c2405235584e45aa91d1e9f979f3de0");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(
            sign(
                "key",
                "a8ce0edb2dd8301dee6c2405235584e45aa91d1e9f979f3de0",
                "1529006854"
            )
            .unwrap(),
            expected
        );
    }

    #[test]
    fn test_signature_verification() {
        let signature = sign(KEY, "token-abc", "1529006854").unwrap();

        assert!(verify(KEY, "token-abc", "1529006854", &signature));

        // Wrong key, token or timestamp should fail
        assert!(!verify("other-key", "token-abc", "1529006854", &signature));
        assert!(!verify(KEY, "token-abd", "1529006854", &signature));
        assert!(!verify(KEY, "token-abc", "1529006855", &signature));
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let signature = sign(KEY, "token", "1700000000").unwrap();
        let bytes = hex::decode(&signature).unwrap();

        for byte in 0..bytes.len() {
            for bit in 0..8 {
                let mut flipped = bytes.clone();
                flipped[byte] ^= 1 << bit;
                assert!(!verify(KEY, "token", "1700000000", &hex::encode(&flipped)));
            }
        }
    }

    #[test]
    fn test_empty_or_malformed_inputs_rejected() {
        let signature = sign(KEY, "token", "1700000000").unwrap();

        assert!(!verify(KEY, "", "1700000000", &signature));
        assert!(!verify(KEY, "token", "", &signature));
        assert!(!verify(KEY, "token", "1700000000", ""));
        assert!(!verify(KEY, "token", "1700000000", "not-hex"));
        assert!(!verify(KEY, "token", "1700000000", &signature[..10]));
    }

    #[test]
    fn test_verifier_rejects_stale_timestamp() {
        let now = Utc::now();
        let verifier = SignatureVerifier::new(KEY, 300);

        let fresh = now.timestamp().to_string();
        let fresh_sig = sign(KEY, "token", &fresh).unwrap();
        assert!(verifier.check("token", &fresh, &fresh_sig, now));

        let stale = (now.timestamp() - 301).to_string();
        let stale_sig = sign(KEY, "token", &stale).unwrap();
        assert!(!verifier.check("token", &stale, &stale_sig, now));

        assert!(!verifier.check("token", "yesterday", &fresh_sig, now));
    }

    #[test]
    fn test_verifier_without_max_age_ignores_timestamp_age() {
        let verifier = SignatureVerifier::new(KEY, 0);
        let signature = sign(KEY, "token", "946684800").unwrap();

        assert!(verifier.check("token", "946684800", &signature, Utc::now()));
    }
}
