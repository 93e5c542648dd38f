use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    Form, Json,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::server::AppState;
use crate::updater::{self, Applied};
use crate::webhook::{EventKind, WebhookPayload};

/// Receive one Mailgun lead event.
///
/// The kind segment selects the field table; the form is checked for
/// required fields, then the signature, before the lead is touched.
pub async fn mailgun_lead_event(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<(StatusCode, Json<Applied>), ApiError> {
    let kind = EventKind::parse(&kind).ok_or(ApiError::UnknownEvent(kind))?;

    let Form(form) = form.map_err(|e| ApiError::Validation(e.body_text()))?;

    let payload = WebhookPayload::from_form(kind, &form)
        .map_err(|missing| ApiError::missing_fields(&missing))?;

    if !state.verifier.check(
        &payload.token,
        &payload.timestamp,
        &payload.signature,
        Utc::now(),
    ) {
        tracing::warn!(
            kind = %kind,
            message_id = %payload.message_id,
            "Rejected webhook with invalid signature"
        );
        return Err(ApiError::AuthFailure);
    }

    tracing::debug!(
        kind = %kind,
        message_id = %payload.message_id,
        domain = %payload.domain,
        provider_event = %payload.provider_event,
        "webhook verified"
    );

    let applied = updater::apply_event(
        &state.db,
        &payload.recipient,
        &payload.event,
        &payload.token,
    )?;

    Ok((StatusCode::ACCEPTED, Json(applied)))
}
