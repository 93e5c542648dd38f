use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counters written periodically by the dashboard job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub id: i64,
    pub total_unique_visitors: i64,
    pub total_appends: i64,
    pub last_update: Option<DateTime<Utc>>,
}
