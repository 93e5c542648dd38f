//! Applies verified Mailgun events to lead engagement records.
//!
//! One webhook call maps to one immediate write transaction: the recipient is
//! resolved to a visitor, the visitor to exactly one lead, the webhook token is
//! claimed and the mutated lead saved. Any failure rolls the whole unit back.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Database, LeadRepository};
use crate::error::{ApiError, NotFoundReason};
use crate::models::LeadEvent;

/// Success body returned to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    /// Visitor the updated lead belongs to
    pub v_id: i64,
    pub email: String,
    pub event: String,
    pub status: &'static str,
}

/// Resolve `recipient` and apply `event` against an open transaction.
///
/// Returns the domain outcome in the inner result; the outer result carries
/// storage failures only. Nothing is written unless the inner result is `Ok`.
pub fn apply_with<R: LeadRepository + ?Sized>(
    repo: &R,
    recipient: &str,
    event: &LeadEvent,
    token: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Result<Applied, ApiError>> {
    let Some(visitor) = repo.find_visitor_by_email(recipient)? else {
        return Ok(Err(ApiError::NotFound(NotFoundReason::Recipient)));
    };

    let mut leads = repo.find_leads_by_visitor_id(visitor.id)?;
    if leads.len() != 1 {
        tracing::warn!(
            visitor_id = visitor.id,
            matches = leads.len(),
            "visitor does not resolve to exactly one lead"
        );
        return Ok(Err(ApiError::NotFound(NotFoundReason::Lead)));
    }
    let mut lead = leads.remove(0);

    if !repo.claim_token(token, now)? {
        return Ok(Err(ApiError::Replayed));
    }

    lead.apply(event, now);
    repo.save_lead(&lead)?;

    Ok(Ok(Applied {
        v_id: lead.visitor_id,
        email: visitor.email,
        event: event.kind().as_str().to_string(),
        status: "success",
    }))
}

/// Apply one verified webhook event in its own transaction
pub fn apply_event(
    db: &Database,
    recipient: &str,
    event: &LeadEvent,
    token: &str,
) -> Result<Applied, ApiError> {
    let now = Utc::now();
    let outcome = db
        .write(|tx| apply_with(tx, recipient, event, token, now))
        .map_err(ApiError::storage)?;

    if let Ok(applied) = &outcome {
        tracing::info!(
            v_id = applied.v_id,
            event = %applied.event,
            "lead engagement updated"
        );
    }
    outcome
}
