use anyhow::Result;
use rand::RngCore;
use serde::Serialize;

use super::OutputFormat;
use crate::webhook;

/// Signed webhook parameters, as Mailgun would post them
#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub timestamp: String,
    pub token: String,
    pub signature: String,
}

impl std::fmt::Display for SignResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "timestamp={}", self.timestamp)?;
        writeln!(f, "token={}", self.token)?;
        write!(f, "signature={}", self.signature)
    }
}

/// Mailgun tokens are 50 hex characters
fn random_token() -> String {
    let mut bytes = [0u8; 25];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build a signature for hand-crafted webhook calls
pub fn sign_webhook(
    key: &str,
    token: Option<&str>,
    timestamp: Option<&str>,
) -> Result<SignResponse> {
    let timestamp = timestamp
        .map(str::to_string)
        .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());
    let token = token.map(str::to_string).unwrap_or_else(random_token);
    let signature = webhook::sign(key, &token, &timestamp)?;

    Ok(SignResponse {
        timestamp,
        token,
        signature,
    })
}

pub fn run_sign(
    key: &str,
    token: Option<&str>,
    timestamp: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let response = sign_webhook(key, token, timestamp)?;
    format.print(&response);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_signature_verifies() {
        let response = sign_webhook("key-1", None, None).unwrap();

        assert_eq!(response.token.len(), 50);
        assert!(webhook::verify(
            "key-1",
            &response.token,
            &response.timestamp,
            &response.signature
        ));
    }

    #[test]
    fn test_explicit_inputs_are_kept() {
        let response = sign_webhook("key-1", Some("tok"), Some("1700000000")).unwrap();

        assert_eq!(response.token, "tok");
        assert_eq!(response.timestamp, "1700000000");
        assert_eq!(
            response.signature,
            webhook::sign("key-1", "tok", "1700000000").unwrap()
        );
    }
}
