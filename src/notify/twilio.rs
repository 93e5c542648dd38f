use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{Notification, Notifier};

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";

/// Sends SMS through the Twilio messages API
pub struct TwilioSms {
    client: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSms {
    pub fn new(account_sid: &str, auth_token: &str, from_number: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: TWILIO_API_URL.to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TwilioSms {
    async fn send(&self, notification: &Notification) -> Result<String> {
        let Notification::Sms { to, body } = notification else {
            anyhow::bail!("Twilio cannot send {} notifications", notification.channel());
        };

        let resp = self
            .client
            .post(format!(
                "{}/Accounts/{}/Messages.json",
                self.api_url, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", body.as_str()),
            ])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .context("Failed to send SMS")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Twilio send failed: {} - {}", status, body);
        }

        #[derive(Deserialize)]
        struct MessageResponse {
            sid: String,
        }

        let message: MessageResponse = resp
            .json()
            .await
            .context("Failed to parse Twilio response")?;
        Ok(message.sid)
    }
}
