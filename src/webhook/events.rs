use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Engagement, LeadEvent};

/// Lead webhook kinds, one per Mailgun callback URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Delivered,
    Dropped,
    HardBounce,
    SpamComplaint,
    Unsubscribe,
    Click,
    Open,
}

/// Fields every Mailgun lead callback must carry
pub const COMMON_FIELDS: [&str; 7] = [
    "Message-Id",
    "domain",
    "event",
    "timestamp",
    "recipient",
    "signature",
    "token",
];

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Delivered,
        EventKind::Dropped,
        EventKind::HardBounce,
        EventKind::SpamComplaint,
        EventKind::Unsubscribe,
        EventKind::Click,
        EventKind::Open,
    ];

    /// Name used in the callback URL and stored as the lead status
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Delivered => "delivered",
            EventKind::Dropped => "dropped",
            EventKind::HardBounce => "hard-bounce",
            EventKind::SpamComplaint => "spam-complaint",
            EventKind::Unsubscribe => "unsubscribe",
            EventKind::Click => "click",
            EventKind::Open => "open",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Form fields required on top of [`COMMON_FIELDS`]
    pub fn extra_fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::Delivered | EventKind::SpamComplaint | EventKind::Unsubscribe => &[],
            EventKind::Dropped => &["reason", "code", "description"],
            EventKind::HardBounce => &["code", "error"],
            EventKind::Click | EventKind::Open => &["ip", "device-type", "campaign-name"],
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed lead callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    pub message_id: String,
    pub mailgun_sid: Option<String>,
    pub domain: String,
    /// Event name as reported by the provider
    pub provider_event: String,
    pub timestamp: String,
    pub recipient: String,
    pub signature: String,
    pub token: String,
    pub event: LeadEvent,
}

impl WebhookPayload {
    /// Extract the fields `kind` needs from a decoded form body.
    ///
    /// Fields that are not part of the kind's table are ignored. On failure
    /// every missing field name is returned, in table order.
    pub fn from_form(
        kind: EventKind,
        form: &HashMap<String, String>,
    ) -> Result<Self, Vec<&'static str>> {
        let missing: Vec<&'static str> = COMMON_FIELDS
            .iter()
            .chain(kind.extra_fields())
            .copied()
            .filter(|name| !form.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        let field = |name: &str| form.get(name).cloned().unwrap_or_default();

        let event = match kind {
            EventKind::Delivered => LeadEvent::Delivered,
            EventKind::Dropped => LeadEvent::Dropped {
                reason: field("reason"),
                code: field("code"),
                description: field("description"),
            },
            EventKind::HardBounce => LeadEvent::HardBounce {
                code: field("code"),
                error: field("error"),
            },
            EventKind::SpamComplaint => LeadEvent::SpamComplaint,
            EventKind::Unsubscribe => LeadEvent::Unsubscribe,
            EventKind::Click => LeadEvent::Click(engagement(&field)),
            EventKind::Open => LeadEvent::Open(engagement(&field)),
        };

        Ok(Self {
            message_id: field("Message-Id"),
            mailgun_sid: form.get("X-Mailgun-Sid").cloned(),
            domain: field("domain"),
            provider_event: field("event"),
            timestamp: field("timestamp"),
            recipient: field("recipient"),
            signature: field("signature"),
            token: field("token"),
            event,
        })
    }
}

fn engagement(field: &impl Fn(&str) -> String) -> Engagement {
    Engagement {
        ip: field("ip"),
        device_type: field("device-type"),
        campaign_name: field("campaign-name"),
    }
}
