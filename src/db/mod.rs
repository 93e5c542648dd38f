use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::models::{DashboardSnapshot, Lead, Visitor};

const MIGRATION_001: &str = include_str!("migrations/001_initial.sql");

/// How long SQLite keeps retrying a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const LEAD_COLUMNS: &str = "id, visitor_id, followup_email_delivered, followup_email_status,
    followup_email_dropped, dropped_reason, dropped_code, dropped_description,
    followup_email_bounced, bounce_error, followup_email_spam, followup_email_unsub,
    followup_email_clicks, followup_email_opens,
    followup_email_click_ip, followup_email_click_device, followup_email_click_campaign,
    followup_email_open_ip, followup_email_open_device, followup_email_open_campaign,
    webhook_last_update";

/// Lookups and writes the webhook pipeline needs, run against one transaction
pub trait LeadRepository {
    fn find_visitor_by_email(&self, email: &str) -> Result<Option<Visitor>>;

    /// All leads referencing a visitor; callers decide what multiplicity means
    fn find_leads_by_visitor_id(&self, visitor_id: i64) -> Result<Vec<Lead>>;

    fn save_lead(&self, lead: &Lead) -> Result<()>;

    /// Record a webhook token as applied. Returns false if it was already used.
    fn claim_token(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;
}

impl LeadRepository for Connection {
    fn find_visitor_by_email(&self, email: &str) -> Result<Option<Visitor>> {
        self.query_row(
            "SELECT id, email FROM visitors WHERE email = ?1",
            params![email],
            |row| {
                Ok(Visitor {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()
        .context("Failed to get visitor by email")
    }

    fn find_leads_by_visitor_id(&self, visitor_id: i64) -> Result<Vec<Lead>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {} FROM leads WHERE visitor_id = ?1 ORDER BY id",
            LEAD_COLUMNS
        ))?;

        let leads = stmt.query_map(params![visitor_id], lead_from_row)?;

        leads
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to get leads for visitor")
    }

    fn save_lead(&self, lead: &Lead) -> Result<()> {
        let updated = self
            .execute(
                r#"
                UPDATE leads SET
                    followup_email_delivered = ?2,
                    followup_email_status = ?3,
                    followup_email_dropped = ?4,
                    dropped_reason = ?5,
                    dropped_code = ?6,
                    dropped_description = ?7,
                    followup_email_bounced = ?8,
                    bounce_error = ?9,
                    followup_email_spam = ?10,
                    followup_email_unsub = ?11,
                    followup_email_clicks = ?12,
                    followup_email_opens = ?13,
                    followup_email_click_ip = ?14,
                    followup_email_click_device = ?15,
                    followup_email_click_campaign = ?16,
                    followup_email_open_ip = ?17,
                    followup_email_open_device = ?18,
                    followup_email_open_campaign = ?19,
                    webhook_last_update = ?20
                WHERE id = ?1
                "#,
                params![
                    lead.id,
                    lead.delivered,
                    lead.status,
                    lead.dropped,
                    lead.dropped_reason,
                    lead.dropped_code,
                    lead.dropped_description,
                    lead.bounced,
                    lead.bounce_error,
                    lead.spam,
                    lead.unsubscribed,
                    lead.clicks,
                    lead.opens,
                    lead.click_ip,
                    lead.click_device,
                    lead.click_campaign,
                    lead.open_ip,
                    lead.open_device,
                    lead.open_campaign,
                    lead.webhook_last_update.map(|t| t.timestamp()),
                ],
            )
            .context("Failed to save lead")?;

        if updated != 1 {
            anyhow::bail!("Lead {} disappeared before it could be saved", lead.id);
        }
        Ok(())
    }

    fn claim_token(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        let inserted = self
            .execute(
                "INSERT OR IGNORE INTO used_tokens (token, used_at) VALUES (?1, ?2)",
                params![token, now.timestamp()],
            )
            .context("Failed to record webhook token")?;
        Ok(inserted == 1)
    }
}

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        visitor_id: row.get(1)?,
        delivered: row.get(2)?,
        status: row.get(3)?,
        dropped: row.get(4)?,
        dropped_reason: row.get(5)?,
        dropped_code: row.get(6)?,
        dropped_description: row.get(7)?,
        bounced: row.get(8)?,
        bounce_error: row.get(9)?,
        spam: row.get(10)?,
        unsubscribed: row.get(11)?,
        clicks: row.get(12)?,
        opens: row.get(13)?,
        click_ip: row.get(14)?,
        click_device: row.get(15)?,
        click_campaign: row.get(16)?,
        open_ip: row.get(17)?,
        open_device: row.get(18)?,
        open_campaign: row.get(19)?,
        webhook_last_update: row
            .get::<_, Option<i64>>(20)?
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(MIGRATION_001)
            .context("Failed to run migration 001")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    /// Run `f` inside an immediate write transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; any error rolls back
    /// everything `f` wrote.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin transaction")?;
        let value = f(&tx)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(value)
    }

    // ==================== Visitor / Lead Operations ====================

    /// Insert a visitor (normally done by the upstream append process)
    pub fn create_visitor(&self, visitor: &Visitor) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO visitors (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![visitor.id, visitor.email, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Insert a lead (normally done by the upstream lead generator)
    pub fn create_lead(&self, lead: &Lead) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO leads (id, visitor_id, followup_email_status) VALUES (?1, ?2, ?3)",
            params![lead.id, lead.visitor_id, lead.status],
        )?;
        conn.save_lead(lead)
    }

    /// Get a lead by ID
    pub fn get_lead(&self, id: i64) -> Result<Option<Lead>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS),
            params![id],
            lead_from_row,
        )
        .optional()
        .context("Failed to get lead")
    }

    // ==================== Dashboard Operations ====================

    /// Append a dashboard snapshot (normally done by the aggregation job)
    pub fn insert_snapshot(
        &self,
        total_unique_visitors: i64,
        total_appends: i64,
        last_update: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dashboard (total_unique_visitors, total_appends, last_update)
             VALUES (?1, ?2, ?3)",
            params![total_unique_visitors, total_appends, last_update.timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent snapshots first
    pub fn latest_snapshots(&self, limit: usize) -> Result<Vec<DashboardSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, total_unique_visitors, total_appends, last_update
             FROM dashboard
             ORDER BY last_update DESC, id DESC
             LIMIT ?1",
        )?;

        let snapshots = stmt.query_map(params![limit as i64], |row| {
            Ok(DashboardSnapshot {
                id: row.get(0)?,
                total_unique_visitors: row.get(1)?,
                total_appends: row.get(2)?,
                last_update: row
                    .get::<_, Option<i64>>(3)?
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            })
        })?;

        snapshots
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to get dashboard snapshots")
    }

    // ==================== Token Operations ====================

    /// Check if a webhook token has been applied
    pub fn is_token_used(&self, token: &str) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT 1 FROM used_tokens WHERE token = ?1")?;
        let exists = stmt.exists(params![token])?;
        Ok(exists)
    }

    /// Forget tokens claimed more than `retention_secs` ago
    pub fn cleanup_old_tokens(&self, retention_secs: i64) -> Result<usize> {
        let conn = self.lock()?;
        let cutoff = Utc::now().timestamp() - retention_secs;
        let count = conn.execute(
            "DELETE FROM used_tokens WHERE used_at < ?1",
            params![cutoff],
        )?;
        Ok(count)
    }
}
