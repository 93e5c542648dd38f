mod mailgun;
mod queue;
mod twilio;

pub use mailgun::*;
pub use queue::*;
pub use twilio::*;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An outbound message produced by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Notification {
    Email {
        to: String,
        subject: String,
        html: String,
    },
    Sms {
        to: String,
        body: String,
    },
}

impl Notification {
    pub fn channel(&self) -> &'static str {
        match self {
            Notification::Email { .. } => "email",
            Notification::Sms { .. } => "sms",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::Email { to, .. } | Notification::Sms { to, .. } => to,
        }
    }
}

/// Trait for outbound message providers
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification, returning the provider's message id
    async fn send(&self, notification: &Notification) -> Result<String>;
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<String> {
        let id = format!("log-{}", uuid::Uuid::new_v4().simple());
        match notification {
            Notification::Email { to, subject, .. } => {
                tracing::info!(id = %id, to = %to, subject = %subject, "email notification");
            }
            Notification::Sms { to, body } => {
                tracing::info!(id = %id, to = %to, body = %body, "sms notification");
            }
        }
        Ok(id)
    }
}

/// Routes email and SMS to separate providers
pub struct Dispatcher {
    email: Arc<dyn Notifier>,
    sms: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(email: Arc<dyn Notifier>, sms: Arc<dyn Notifier>) -> Self {
        Self { email, sms }
    }
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, notification: &Notification) -> Result<String> {
        match notification {
            Notification::Email { .. } => self.email.send(notification).await,
            Notification::Sms { .. } => self.sms.send(notification).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notification: &Notification) -> Result<String> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(self.name.to_string())
        }
    }

    #[tokio::test]
    async fn test_dispatcher_routes_by_channel() {
        let email = Arc::new(Recorder {
            name: "mail",
            ..Default::default()
        });
        let sms = Arc::new(Recorder {
            name: "sms",
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(email.clone(), sms.clone());

        let id = dispatcher
            .send(&Notification::Sms {
                to: "+15550100".into(),
                body: "stalled".into(),
            })
            .await
            .unwrap();

        assert_eq!(id, "sms");
        assert!(email.sent.lock().unwrap().is_empty());
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_returns_id() {
        let id = LogNotifier
            .send(&Notification::Email {
                to: "ops@example.com".into(),
                subject: "s".into(),
                html: "<p>b</p>".into(),
            })
            .await
            .unwrap();

        assert!(id.starts_with("log-"));
    }
}
