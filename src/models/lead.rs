use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webhook::EventKind;

/// Status a lead carries before any provider event has been applied
pub const STATUS_NOT_SENT: &str = "NOTSENT";

/// Follow-up email engagement state for one lead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub visitor_id: i64,
    pub delivered: bool,
    /// Name of the last event kind applied, `NOTSENT` until the first one
    pub status: String,
    pub dropped: bool,
    pub dropped_reason: Option<String>,
    /// Shared by dropped and hard-bounce events
    pub dropped_code: Option<String>,
    pub dropped_description: Option<String>,
    pub bounced: bool,
    pub bounce_error: Option<String>,
    pub spam: bool,
    pub unsubscribed: bool,
    pub clicks: i64,
    pub opens: i64,
    pub click_ip: Option<String>,
    pub click_device: Option<String>,
    pub click_campaign: Option<String>,
    pub open_ip: Option<String>,
    pub open_device: Option<String>,
    pub open_campaign: Option<String>,
    pub webhook_last_update: Option<DateTime<Utc>>,
}

impl Lead {
    /// A lead with no engagement recorded yet
    pub fn new(id: i64, visitor_id: i64) -> Self {
        Self {
            id,
            visitor_id,
            delivered: false,
            status: STATUS_NOT_SENT.to_string(),
            dropped: false,
            dropped_reason: None,
            dropped_code: None,
            dropped_description: None,
            bounced: false,
            bounce_error: None,
            spam: false,
            unsubscribed: false,
            clicks: 0,
            opens: 0,
            click_ip: None,
            click_device: None,
            click_campaign: None,
            open_ip: None,
            open_device: None,
            open_campaign: None,
            webhook_last_update: None,
        }
    }

    /// Apply a provider event to the engagement state.
    ///
    /// Every kind other than `delivered` clears the delivered flag. Counters
    /// grow by exactly one per applied event.
    pub fn apply(&mut self, event: &LeadEvent, now: DateTime<Utc>) {
        match event {
            LeadEvent::Delivered => {
                self.delivered = true;
            }
            LeadEvent::Dropped {
                reason,
                code,
                description,
            } => {
                self.delivered = false;
                self.dropped = true;
                self.dropped_reason = Some(reason.clone());
                self.dropped_code = Some(code.clone());
                self.dropped_description = Some(description.clone());
            }
            LeadEvent::HardBounce { code, error } => {
                self.delivered = false;
                self.bounced = true;
                self.dropped_code = Some(code.clone());
                self.bounce_error = Some(error.clone());
            }
            LeadEvent::SpamComplaint => {
                self.delivered = false;
                self.spam = true;
            }
            LeadEvent::Unsubscribe => {
                self.delivered = false;
                self.unsubscribed = true;
            }
            LeadEvent::Click(engagement) => {
                self.delivered = false;
                self.clicks += 1;
                self.click_ip = Some(engagement.ip.clone());
                self.click_device = Some(engagement.device_type.clone());
                self.click_campaign = Some(engagement.campaign_name.clone());
            }
            LeadEvent::Open(engagement) => {
                self.delivered = false;
                self.opens += 1;
                self.open_ip = Some(engagement.ip.clone());
                self.open_device = Some(engagement.device_type.clone());
                self.open_campaign = Some(engagement.campaign_name.clone());
            }
        }

        self.status = event.kind().as_str().to_string();
        self.webhook_last_update = Some(now);
    }
}

/// Metadata Mailgun attaches to click and open events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub ip: String,
    pub device_type: String,
    pub campaign_name: String,
}

/// A lead mutation carried by one webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LeadEvent {
    Delivered,
    Dropped {
        reason: String,
        code: String,
        description: String,
    },
    HardBounce {
        code: String,
        error: String,
    },
    SpamComplaint,
    Unsubscribe,
    Click(Engagement),
    Open(Engagement),
}

impl LeadEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LeadEvent::Delivered => EventKind::Delivered,
            LeadEvent::Dropped { .. } => EventKind::Dropped,
            LeadEvent::HardBounce { .. } => EventKind::HardBounce,
            LeadEvent::SpamComplaint => EventKind::SpamComplaint,
            LeadEvent::Unsubscribe => EventKind::Unsubscribe,
            LeadEvent::Click(_) => EventKind::Click,
            LeadEvent::Open(_) => EventKind::Open,
        }
    }
}
