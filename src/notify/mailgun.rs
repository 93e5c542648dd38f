use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{Notification, Notifier};

const MAILGUN_API_URL: &str = "https://api.mailgun.net/v3";

/// Sends email through the Mailgun messages API
pub struct MailgunMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    domain: String,
    sender: String,
}

impl MailgunMailer {
    pub fn new(api_key: &str, domain: &str, sender: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: MAILGUN_API_URL.to_string(),
            api_key: api_key.to_string(),
            domain: domain.to_string(),
            sender: sender.to_string(),
        }
    }

    /// Point the mailer at a different API host (EU region, test servers)
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Notifier for MailgunMailer {
    async fn send(&self, notification: &Notification) -> Result<String> {
        let Notification::Email { to, subject, html } = notification else {
            anyhow::bail!("Mailgun cannot send {} notifications", notification.channel());
        };

        let resp = self
            .client
            .post(format!("{}/{}/messages", self.api_url, self.domain))
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.sender.as_str()),
                ("to", to.as_str()),
                ("subject", subject.as_str()),
                ("text", "EARL API v1.0"),
                ("html", html.as_str()),
            ])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .context("Failed to send email")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mailgun send failed: {} - {}", status, body);
        }

        #[derive(Deserialize)]
        struct MessageResponse {
            id: String,
        }

        let message: MessageResponse = resp
            .json()
            .await
            .context("Failed to parse Mailgun response")?;
        Ok(message.id)
    }
}
