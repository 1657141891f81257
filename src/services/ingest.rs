// Ingest service
// Live submission path: one lead message at a time, through the same
// reconciliation step the scanner uses.

use chrono::Utc;

use crate::db::{LeadUpsert, UpsertKind, UpsertOutcome, UNKNOWN_AGENT};
use crate::error::LeadError;
use crate::parser::{parse_webhook_body, LeadField};
use crate::reconcile::reconcile_message;
use crate::source::{InboundMessage, Reaction};
use crate::state::AppState;
use crate::status::LeadStatus;

/// Record a lead message as the chat layer sees it right now.
///
/// `reactions` is the message's current reaction set; an empty set leaves a
/// new lead in `new`. Malformed fields never fail the call, they default.
pub fn ingest(
    state: &AppState,
    external_id: i64,
    fields: Vec<LeadField>,
    title: Option<String>,
    reactions: Vec<Reaction>,
) -> Result<UpsertOutcome, LeadError> {
    let message = InboundMessage {
        id: Some(external_id),
        channel_id: None,
        title,
        fields,
        reactions,
        created_at: Some(Utc::now()),
    };
    let bot_users = state.config().bot_users;
    let outcome = reconcile_message(state, &message, &bot_users)?;
    log::info!("Ingested lead {} ({:?})", external_id, outcome.kind);
    Ok(outcome)
}

/// Record a raw webhook body before it has been posted to the channel.
///
/// A webhook carries no reactions, so an id that is already stored is left
/// alone rather than reset to `new`.
pub fn ingest_webhook(
    state: &AppState,
    external_id: i64,
    body: &str,
) -> Result<UpsertOutcome, LeadError> {
    let draft = parse_webhook_body(body);
    let outcome = state.with_db_write(|db| {
        if let Some(existing) = db.get_lead(external_id)? {
            return Ok(UpsertOutcome {
                kind: UpsertKind::Unchanged,
                previous_status: Some(existing.status),
                sale_recorded: false,
            });
        }
        db.upsert_lead(&LeadUpsert {
            external_id,
            draft: &draft,
            status: LeadStatus::New,
            agent: UNKNOWN_AGENT,
            created_at: Utc::now(),
        })
    })?;
    log::info!("Webhook lead {} ({:?})", external_id, outcome.kind);
    Ok(outcome)
}
