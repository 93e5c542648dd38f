//! Dashboard health check.
//!
//! The aggregation job appends a snapshot of global counters on every run.
//! If the two newest snapshots carry identical counters the pipeline feeding
//! them has stalled: identical unique-visitor totals raise an email alert, and
//! identical append totals on top of that page every administrator by SMS.

use serde::Serialize;

use crate::db::Database;
use crate::models::DashboardSnapshot;
use crate::notify::{JobId, Notification, NotificationQueue};

/// Counters at or below this are too small to call stalled
pub const COUNTER_FLOOR: i64 = 4;

/// Where health alerts go
#[derive(Debug, Clone, Default)]
pub struct AlertTargets {
    pub alert_email: Option<String>,
    pub admin_phones: Vec<String>,
}

/// Which escalations the two newest snapshots call for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub email_alert: bool,
    pub sms_alert: bool,
}

impl Verdict {
    pub fn healthy(&self) -> bool {
        !self.email_alert && !self.sms_alert
    }
}

/// Compare the newest snapshot against the one before it.
///
/// Equality is exact. With fewer than two snapshots nothing can be compared
/// and the verdict is healthy.
pub fn evaluate(snapshots: &[DashboardSnapshot]) -> Verdict {
    let [latest, previous, ..] = snapshots else {
        return Verdict {
            email_alert: false,
            sms_alert: false,
        };
    };

    let stalled = |a: i64, b: i64| a > COUNTER_FLOOR && b > COUNTER_FLOOR && a == b;

    let email_alert = stalled(latest.total_unique_visitors, previous.total_unique_visitors);
    let sms_alert = email_alert && stalled(latest.total_appends, previous.total_appends);

    Verdict {
        email_alert,
        sms_alert,
    }
}

/// Health endpoint body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    /// Escalations the snapshots call for
    pub verdict: Verdict,
    /// Whether an alert email was actually queued
    pub email_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<JobId>,
    /// Jobs enqueued for each administrator SMS
    pub sms: Vec<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_unique_visitors: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_appends: Option<i64>,
}

impl HealthReport {
    fn new(verdict: Verdict, latest: Option<&DashboardSnapshot>) -> Self {
        Self {
            status: if verdict.healthy() { "healthy" } else { "alert" },
            verdict,
            email_alert: false,
            email: None,
            sms: Vec::new(),
            latest_unique_visitors: latest.map(|s| s.total_unique_visitors),
            latest_appends: latest.map(|s| s.total_appends),
        }
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        if let (Some(unique), Some(appends)) = (self.latest_unique_visitors, self.latest_appends)
        {
            writeln!(f, "Latest snapshot: {} unique visitors, {} appends", unique, appends)?;
        }
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        writeln!(
            f,
            "Email alert: {} (queued: {})",
            yes_no(self.verdict.email_alert),
            yes_no(self.email_alert)
        )?;
        write!(
            f,
            "SMS alert: {} (queued: {})",
            yes_no(self.verdict.sms_alert),
            self.sms.len()
        )
    }
}

/// Load the two newest snapshots and judge them, without notifying anyone
pub fn inspect(db: &Database) -> anyhow::Result<HealthReport> {
    let snapshots = db.latest_snapshots(2)?;
    Ok(HealthReport::new(evaluate(&snapshots), snapshots.first()))
}

/// Run the health check and enqueue whatever alerts it calls for
pub fn run_check(
    db: &Database,
    queue: &NotificationQueue,
    targets: &AlertTargets,
) -> anyhow::Result<HealthReport> {
    let snapshots = db.latest_snapshots(2)?;
    let verdict = evaluate(&snapshots);
    let latest = snapshots.first();
    let mut report = HealthReport::new(verdict, latest);

    if verdict.healthy() {
        return Ok(report);
    }

    // evaluate() only alerts with two snapshots present
    let (unique, appends) = latest
        .map(|s| (s.total_unique_visitors, s.total_appends))
        .unwrap_or_default();

    if verdict.email_alert {
        match &targets.alert_email {
            Some(to) => {
                let email = Notification::Email {
                    to: to.clone(),
                    subject: "EARL dashboard stalled".to_string(),
                    html: format!(
                        "<p>The global dashboard reported {} unique visitors in both of its last two runs.</p>\
                         <p>Check the visitor ingestion and append jobs.</p>",
                        unique
                    ),
                };
                match queue.enqueue(email) {
                    Ok(id) => {
                        report.email_alert = true;
                        report.email = Some(id);
                    }
                    Err(e) => tracing::error!("Failed to enqueue health alert email: {}", e),
                }
            }
            None => tracing::warn!("dashboard stalled but no alert email configured"),
        }
    }

    if verdict.sms_alert {
        for phone in &targets.admin_phones {
            let sms = Notification::Sms {
                to: phone.clone(),
                body: format!(
                    "EARL alert: dashboard stalled at {} unique visitors / {} appends",
                    unique, appends
                ),
            };
            match queue.enqueue(sms) {
                Ok(id) => report.sms.push(id),
                Err(e) => tracing::error!(to = %phone, "Failed to enqueue health alert SMS: {}", e),
            }
        }
    }

    tracing::warn!(
        unique_visitors = unique,
        appends,
        email_alert = report.email_alert,
        sms_sent = report.sms.len(),
        "dashboard health check raised alerts"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Notifier, RetryPolicy};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::{Arc, Mutex};

    fn snapshot(id: i64, unique: i64, appends: i64) -> DashboardSnapshot {
        DashboardSnapshot {
            id,
            total_unique_visitors: unique,
            total_appends: appends,
            last_update: None,
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notification: &Notification) -> anyhow::Result<String> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_equal_counters_fire_both_alerts() {
        let verdict = evaluate(&[snapshot(2, 10, 20), snapshot(1, 10, 20)]);
        assert!(verdict.email_alert);
        assert!(verdict.sms_alert);
    }

    #[test]
    fn test_moving_counters_are_healthy() {
        let verdict = evaluate(&[snapshot(2, 11, 20), snapshot(1, 10, 20)]);
        assert!(verdict.healthy());
    }

    #[test]
    fn test_appends_moving_only_emails() {
        let verdict = evaluate(&[snapshot(2, 10, 21), snapshot(1, 10, 20)]);
        assert!(verdict.email_alert);
        assert!(!verdict.sms_alert);
    }

    #[test]
    fn test_floor_is_exclusive() {
        assert!(evaluate(&[snapshot(2, 4, 20), snapshot(1, 4, 20)]).healthy());
        assert!(evaluate(&[snapshot(2, 5, 5), snapshot(1, 5, 5)]).sms_alert);
        assert!(!evaluate(&[snapshot(2, 5, 4), snapshot(1, 5, 4)]).sms_alert);
    }

    #[test]
    fn test_single_snapshot_is_healthy() {
        assert!(evaluate(&[]).healthy());
        assert!(evaluate(&[snapshot(1, 10, 20)]).healthy());
    }

    #[tokio::test]
    async fn test_run_check_enqueues_alerts() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_snapshot(10, 20, now - Duration::hours(1)).unwrap();
        db.insert_snapshot(10, 20, now).unwrap();

        let recorder = Arc::new(Recorder::default());
        let (queue, pool) =
            NotificationQueue::start(recorder.clone(), 1, 8, RetryPolicy::default());
        let targets = AlertTargets {
            alert_email: Some("ops@example.com".to_string()),
            admin_phones: vec!["+15550100".to_string(), "+15550101".to_string()],
        };

        let report = run_check(&db, &queue, &targets).unwrap();

        assert_eq!(report.status, "alert");
        assert!(report.email_alert);
        assert!(report.email.is_some());
        assert_eq!(report.sms.len(), 2);

        drop(queue);
        pool.join().await;

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent.iter().filter(|n| n.channel() == "sms").count(), 2);
    }

    #[tokio::test]
    async fn test_email_alert_reflects_what_was_queued() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_snapshot(10, 20, now - Duration::hours(1)).unwrap();
        db.insert_snapshot(10, 21, now).unwrap();

        let recorder = Arc::new(Recorder::default());
        let (queue, pool) =
            NotificationQueue::start(recorder.clone(), 1, 8, RetryPolicy::default());

        // No alert address configured
        let report = run_check(&db, &queue, &AlertTargets::default()).unwrap();
        assert_eq!(report.status, "alert");
        assert!(!report.email_alert);
        assert_eq!(report.email, None);

        // Address configured but the queue has shut down
        let closed = NotificationQueue::closed();
        let targets = AlertTargets {
            alert_email: Some("ops@example.com".to_string()),
            admin_phones: Vec::new(),
        };
        let report = run_check(&db, &closed, &targets).unwrap();
        assert!(report.verdict.email_alert);
        assert!(!report.email_alert);
        assert_eq!(report.email, None);

        drop(queue);
        pool.join().await;
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_check_healthy_sends_nothing() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_snapshot(10, 20, now - Duration::hours(1)).unwrap();
        db.insert_snapshot(11, 20, now).unwrap();

        let recorder = Arc::new(Recorder::default());
        let (queue, pool) =
            NotificationQueue::start(recorder.clone(), 1, 8, RetryPolicy::default());

        let report = run_check(&db, &queue, &AlertTargets::default()).unwrap();

        assert_eq!(report.status, "healthy");
        assert!(report.sms.is_empty());
        assert_eq!(report.latest_unique_visitors, Some(11));

        drop(queue);
        pool.join().await;
        assert!(recorder.sent.lock().unwrap().is_empty());
    }
}
