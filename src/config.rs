use clap::Args;
use std::sync::Arc;
use std::time::Duration;

use crate::monitor::AlertTargets;
use crate::notify::{Dispatcher, LogNotifier, MailgunMailer, Notifier, RetryPolicy, TwilioSms};
use crate::webhook::SignatureVerifier;

/// Server settings, read from flags or `EARL_*` environment variables
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "EARL_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Database file path
    #[arg(long, env = "EARL_DB", default_value = "./earl.db")]
    pub db: String,

    /// Mailgun webhook signing key
    #[arg(long, env = "EARL_MAILGUN_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: String,

    /// Reject webhooks whose timestamp is further than this from now (0 disables).
    /// Must exceed the provider's retry horizon or retried events are lost.
    #[arg(long, env = "EARL_SIGNATURE_MAX_AGE", default_value_t = 0)]
    pub signature_max_age_secs: u64,

    /// Recipient of dashboard health alert emails
    #[arg(long, env = "EARL_ALERT_EMAIL")]
    pub alert_email: Option<String>,

    /// Administrator phone numbers paged by SMS (comma separated)
    #[arg(long = "admin-phone", env = "EARL_ADMIN_PHONES", value_delimiter = ',')]
    pub admin_phones: Vec<String>,

    /// Notification worker tasks
    #[arg(long, env = "EARL_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Notifications buffered before enqueue is refused
    #[arg(long, env = "EARL_QUEUE_CAPACITY", default_value_t = 256)]
    pub queue_capacity: usize,

    /// Send attempts per notification
    #[arg(long, env = "EARL_RETRY_ATTEMPTS", default_value_t = 5)]
    pub retry_attempts: u32,

    /// First retry delay in milliseconds, doubled on each further attempt
    #[arg(long, env = "EARL_RETRY_BASE_MS", default_value_t = 1000)]
    pub retry_base_ms: u64,

    /// Upper bound on the retry delay in milliseconds
    #[arg(long, env = "EARL_RETRY_MAX_MS", default_value_t = 60_000)]
    pub retry_max_ms: u64,

    /// Mailgun sending API key
    #[arg(long, env = "EARL_MAILGUN_API_KEY", hide_env_values = true)]
    pub mailgun_api_key: Option<String>,

    /// Mailgun sending domain
    #[arg(long, env = "EARL_MAILGUN_DOMAIN")]
    pub mailgun_domain: Option<String>,

    /// From address for alert emails
    #[arg(long, env = "EARL_MAILGUN_SENDER", default_value = "EARL <alerts@earl.local>")]
    pub mailgun_sender: String,

    /// Mailgun API base URL (EU accounts use https://api.eu.mailgun.net/v3)
    #[arg(long, env = "EARL_MAILGUN_API_URL")]
    pub mailgun_api_url: Option<String>,

    /// Twilio account SID
    #[arg(long, env = "EARL_TWILIO_SID")]
    pub twilio_sid: Option<String>,

    /// Twilio auth token
    #[arg(long, env = "EARL_TWILIO_TOKEN", hide_env_values = true)]
    pub twilio_token: Option<String>,

    /// Twilio sender number
    #[arg(long, env = "EARL_TWILIO_FROM")]
    pub twilio_from: Option<String>,
}

impl Config {
    pub fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.signing_key.clone(), self.signature_max_age_secs)
    }

    /// How long a used webhook token must be remembered, in seconds.
    ///
    /// A token is replayable for as long as its timestamp passes the freshness
    /// check, which allows skew on both sides of now. Without that check a
    /// signed call stays valid forever, so tokens are never forgotten.
    pub fn token_retention_secs(&self) -> Option<i64> {
        match self.signature_max_age_secs {
            0 => None,
            max_age => Some(i64::try_from(max_age.saturating_mul(2)).unwrap_or(i64::MAX)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
        }
    }

    pub fn alert_targets(&self) -> AlertTargets {
        AlertTargets {
            alert_email: self.alert_email.clone(),
            admin_phones: self
                .admin_phones
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    fn email_notifier(&self) -> Option<MailgunMailer> {
        let (Some(key), Some(domain)) = (&self.mailgun_api_key, &self.mailgun_domain) else {
            return None;
        };
        let mailer = MailgunMailer::new(key, domain, &self.mailgun_sender);
        Some(match &self.mailgun_api_url {
            Some(url) => mailer.with_api_url(url),
            None => mailer,
        })
    }

    fn sms_notifier(&self) -> Option<TwilioSms> {
        match (&self.twilio_sid, &self.twilio_token, &self.twilio_from) {
            (Some(sid), Some(token), Some(from)) => Some(TwilioSms::new(sid, token, from)),
            _ => None,
        }
    }

    /// Build the outbound notifier, logging instead of sending for any
    /// channel without credentials
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        let email: Arc<dyn Notifier> = match self.email_notifier() {
            Some(mailer) => Arc::new(mailer),
            None => {
                tracing::warn!("Mailgun sending not configured, alert emails will only be logged");
                Arc::new(LogNotifier)
            }
        };
        let sms: Arc<dyn Notifier> = match self.sms_notifier() {
            Some(sms) => Arc::new(sms),
            None => {
                tracing::warn!("Twilio not configured, alert SMS will only be logged");
                Arc::new(LogNotifier)
            }
        };
        Arc::new(Dispatcher::new(email, sms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["earl"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--signing-key", "k"]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.signature_max_age_secs, 0);
        assert_eq!(config.token_retention_secs(), None);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.email_notifier().is_none());
        assert!(config.sms_notifier().is_none());
    }

    #[test]
    fn test_token_retention_covers_freshness_window() {
        let config = parse(&["--signing-key", "k", "--signature-max-age-secs", "900"]);

        assert_eq!(config.token_retention_secs(), Some(1800));
    }

    #[test]
    fn test_admin_phones_split() {
        let config = parse(&["--signing-key", "k", "--admin-phone", "+15550100, +15550101,"]);

        assert_eq!(
            config.alert_targets().admin_phones,
            vec!["+15550100".to_string(), "+15550101".to_string()]
        );
    }

    #[test]
    fn test_providers_need_all_credentials() {
        let config = parse(&[
            "--signing-key",
            "k",
            "--twilio-sid",
            "AC1",
            "--twilio-token",
            "t",
            "--mailgun-api-key",
            "key",
        ]);

        assert!(config.sms_notifier().is_none());
        assert!(config.email_notifier().is_none());
    }
}
