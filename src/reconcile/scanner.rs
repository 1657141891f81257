//! One reconciliation pass over the lead channel.
//!
//! Each message is reconciled independently: a failure is logged and counted
//! as skipped, and the pass moves on. Cancellation is checked between
//! messages, so a cancelled pass leaves every already-visited lead consistent
//! and the next pass picks up the rest.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;

use crate::db::{timestamp, DbScanRun, LeadUpsert, UpsertKind, UpsertOutcome, UNKNOWN_AGENT};
use crate::error::LeadError;
use crate::parser::parse_lead;
use crate::source::{InboundMessage, MessageSource, Reaction};
use crate::state::AppState;
use crate::status::{decide, resolve_symbol, LeadStatus, Verdict};

/// Summary of a finished (or cancelled) scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub messages_seen: i64,
    pub inserted: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub skipped: i64,
    pub sales_recorded: i64,
    pub cancelled: bool,
}

impl ScanReport {
    fn tally(&mut self, outcome: &UpsertOutcome) {
        match outcome.kind {
            UpsertKind::Inserted => self.inserted += 1,
            UpsertKind::Updated => self.updated += 1,
            UpsertKind::Unchanged => self.unchanged += 1,
        }
        if outcome.sale_recorded {
            self.sales_recorded += 1;
        }
    }

    fn to_run(&self) -> DbScanRun {
        DbScanRun {
            id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
            messages_seen: self.messages_seen,
            inserted: self.inserted,
            updated: self.updated,
            unchanged: self.unchanged,
            skipped: self.skipped,
            sales_recorded: self.sales_recorded,
            cancelled: self.cancelled,
        }
    }
}

/// Replay the configured lead channel through the store.
///
/// Only one scan runs at a time; a second call while one is in flight
/// returns [`LeadError::ScanInProgress`]. A source failure aborts the pass
/// before anything is written.
pub async fn run_scan(
    state: &AppState,
    source: &dyn MessageSource,
) -> Result<ScanReport, LeadError> {
    if !state.begin_scan() {
        return Err(LeadError::ScanInProgress);
    }
    let result = scan_channel(state, source).await;
    state.end_scan();
    result
}

async fn scan_channel(
    state: &AppState,
    source: &dyn MessageSource,
) -> Result<ScanReport, LeadError> {
    let config = state.config();
    let mut report = ScanReport {
        run_id: uuid::Uuid::new_v4().to_string(),
        started_at: timestamp(Utc::now()),
        ..ScanReport::default()
    };

    let mut messages = source.list_messages(config.lead_channel_id).await?;
    // Oldest first, so a partial pass covers a prefix of the history.
    messages.sort_by_key(|m| m.id);
    log::info!(
        "Scan {}: reconciling {} messages from channel {}",
        report.run_id,
        messages.len(),
        config.lead_channel_id
    );

    for message in &messages {
        if state.scan_cancel_requested() {
            log::info!(
                "Scan {}: cancelled after {} of {} messages",
                report.run_id,
                report.messages_seen,
                messages.len()
            );
            report.cancelled = true;
            break;
        }
        report.messages_seen += 1;

        match reconcile_message(state, message, &config.bot_users) {
            Ok(outcome) => report.tally(&outcome),
            Err(e) => {
                log::warn!(
                    "Scan {}: skipping message {:?}: {}",
                    report.run_id,
                    message.id,
                    e
                );
                report.skipped += 1;
            }
        }

        tokio::task::yield_now().await;
    }

    report.finished_at = timestamp(Utc::now());
    let run = report.to_run();
    if let Err(e) = state.with_db_write(|db| db.insert_scan_run(&run)) {
        log::warn!("Scan {}: failed to record scan run: {}", report.run_id, e);
    }

    log::info!(
        "Scan {}: {} inserted, {} updated, {} unchanged, {} skipped, {} sales",
        report.run_id,
        report.inserted,
        report.updated,
        report.unchanged,
        report.skipped,
        report.sales_recorded
    );
    Ok(report)
}

/// Reconcile one message: derive status and agent from its reactions and
/// upsert the lead.
///
/// Demographics come from the stored row when the lead is already known, so
/// later edits to the message never rewrite them.
pub fn reconcile_message(
    state: &AppState,
    message: &InboundMessage,
    ignored_users: &BTreeSet<String>,
) -> Result<UpsertOutcome, LeadError> {
    let external_id = message
        .id
        .ok_or_else(|| LeadError::Parse("message has no id".to_string()))?;

    let (status, agent) = match resolve_reactions(&message.reactions, ignored_users) {
        Some(verdict) => (verdict.status, verdict.agent),
        None => (LeadStatus::New, UNKNOWN_AGENT.to_string()),
    };
    let created_at = message.created_at.unwrap_or_else(Utc::now);

    let outcome = state.with_db_write(|db| {
        let draft = match db.get_lead(external_id)? {
            Some(existing) => existing.draft(),
            None => parse_lead(&message.fields, message.title.as_deref()),
        };
        db.upsert_lead(&LeadUpsert {
            external_id,
            draft: &draft,
            status,
            agent: &agent,
            created_at,
        })
    })?;
    Ok(outcome)
}

/// Winning verdict among the human reactions on a message.
///
/// Bot reactions, reactions by `ignored_users` and symbols outside the
/// status vocabulary are dropped before the tie-break.
pub fn resolve_reactions(
    reactions: &[Reaction],
    ignored_users: &BTreeSet<String>,
) -> Option<Verdict> {
    let votes = reactions
        .iter()
        .filter(|r| !r.is_bot && !ignored_users.contains(&r.user))
        .filter_map(|r| match resolve_symbol(&r.symbol) {
            Some(status) => Some(Verdict {
                status,
                agent: r.user.clone(),
            }),
            None => {
                log::debug!("Ignoring unrecognized reaction {:?} by {}", r.symbol, r.user);
                None
            }
        });
    decide(votes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::parser::{LeadField, LeadType};
    use crate::source::InMemorySource;
    use crate::state::test_utils::test_state;
    use crate::types::Config;

    fn message(id: i64, reactions: Vec<Reaction>) -> InboundMessage {
        InboundMessage {
            id: Some(id),
            channel_id: None,
            title: Some("Hot Lead".to_string()),
            fields: vec![
                LeadField::new("First Name", "Jane"),
                LeadField::new("Last Name", "Doe"),
                LeadField::new("Age", "34"),
                LeadField::new("Zip", "30301"),
            ],
            reactions,
            created_at: Some(
                chrono::DateTime::parse_from_rfc3339("2025-03-01T15:30:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
        }
    }

    fn bot(symbol: &str, user: &str) -> Reaction {
        Reaction {
            symbol: symbol.to_string(),
            user: user.to_string(),
            is_bot: true,
        }
    }

    #[test]
    fn test_resolve_reactions_filters_bots_and_noise() {
        let ignored: BTreeSet<String> = ["relay".to_string()].into_iter().collect();
        let reactions = vec![
            bot("🔥", "leadbot"),
            Reaction::new("🔥", "relay"),
            Reaction::new("🎉", "amy"),
            Reaction::new("✅", "bob"),
        ];
        let verdict = resolve_reactions(&reactions, &ignored).expect("bob's vote counts");
        assert_eq!(verdict.status, LeadStatus::Called);
        assert_eq!(verdict.agent, "bob");

        assert!(resolve_reactions(&[Reaction::new("🎉", "amy")], &ignored).is_none());
    }

    #[tokio::test]
    async fn test_rescan_is_stable() {
        let state = test_state(Config::default());
        let source = InMemorySource::new(vec![
            message(2, vec![Reaction::new("🔥", "agent7")]),
            message(1, vec![Reaction::new("✅", "amy")]),
            message(3, Vec::new()),
        ]);

        let first = run_scan(&state, &source).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(first.sales_recorded, 1);
        assert!(!first.cancelled);

        let before = state.with_db_read(|db| db.all_leads()).unwrap();
        let second = run_scan(&state, &source).await.unwrap();
        assert_eq!(second.unchanged, 3);
        assert_eq!(second.inserted + second.updated, 0);
        assert_eq!(second.sales_recorded, 0);

        let after = state.with_db_read(|db| db.all_leads()).unwrap();
        assert_eq!(before, after);
        assert_eq!(
            state.with_db_read(|db| db.get_agent_sales("agent7")).unwrap(),
            1
        );

        let lead = state.with_db_read(|db| db.get_lead(3)).unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.agent, UNKNOWN_AGENT);
        assert_eq!(lead.lead_type, LeadType::Hot);

        let runs = state.with_db_read(|db| db.recent_scan_runs(10)).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.run_id);
    }

    #[tokio::test]
    async fn test_reaction_changes_flow_through() {
        let state = test_state(Config::default());
        let source = InMemorySource::new(vec![message(1, vec![Reaction::new("✅", "amy")])]);
        run_scan(&state, &source).await.unwrap();

        source.set_reactions(
            1,
            vec![Reaction::new("✅", "amy"), Reaction::new(":fire:", "amy")],
        );
        let report = run_scan(&state, &source).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.sales_recorded, 1);

        // Moving off sold keeps the counter; it never decrements.
        source.set_reactions(1, vec![Reaction::new("📵", "amy")]);
        run_scan(&state, &source).await.unwrap();
        let lead = state.with_db_read(|db| db.get_lead(1)).unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::DidNotAnswer);
        assert_eq!(state.with_db_read(|db| db.get_agent_sales("amy")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_demographics_frozen_after_insert() {
        let state = test_state(Config::default());
        let source = InMemorySource::new(vec![message(1, Vec::new())]);
        run_scan(&state, &source).await.unwrap();

        let mut edited = message(1, vec![Reaction::new("✅", "amy")]);
        edited.fields = vec![LeadField::new("Name", "Someone Else")];
        let outcome = reconcile_message(&state, &edited, &BTreeSet::new()).unwrap();
        assert_eq!(outcome.kind, UpsertKind::Updated);

        let lead = state.with_db_read(|db| db.get_lead(1)).unwrap().unwrap();
        assert_eq!(lead.name, "Jane Doe");
        assert_eq!(lead.age, Some(34));
        assert_eq!(lead.status, LeadStatus::Called);
    }

    #[tokio::test]
    async fn test_bad_message_is_skipped() {
        let state = test_state(Config {
            bot_users: ["relay".to_string()].into_iter().collect(),
            ..Config::default()
        });
        let mut no_id = message(0, Vec::new());
        no_id.id = None;
        let source = InMemorySource::new(vec![
            no_id,
            message(5, vec![Reaction::new("🔥", "relay")]),
        ]);

        let report = run_scan(&state, &source).await.unwrap();
        assert_eq!(report.messages_seen, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.sales_recorded, 0);

        let lead = state.with_db_read(|db| db.get_lead(5)).unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::New);
    }

    struct FailingSource;

    #[async_trait]
    impl MessageSource for FailingSource {
        async fn list_messages(&self, _channel_id: u64) -> Result<Vec<InboundMessage>, LeadError> {
            Err(LeadError::Source("gateway unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_source_failure_aborts_scan() {
        let state = test_state(Config::default());
        let err = run_scan(&state, &FailingSource).await.unwrap_err();
        assert!(matches!(err, LeadError::Source(_)));
        assert!(!state.is_scan_running());
        assert!(state.with_db_read(|db| db.last_scan_run()).unwrap().is_none());
    }

    /// Requests cancellation while the message list is being fetched.
    struct CancellingSource {
        state: Arc<AppState>,
        inner: InMemorySource,
    }

    #[async_trait]
    impl MessageSource for CancellingSource {
        async fn list_messages(&self, channel_id: u64) -> Result<Vec<InboundMessage>, LeadError> {
            self.state.request_scan_cancel();
            self.inner.list_messages(channel_id).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_scan_resumes_next_pass() {
        let state = Arc::new(test_state(Config::default()));
        let cancelling = CancellingSource {
            state: state.clone(),
            inner: InMemorySource::new(vec![
                message(1, vec![Reaction::new("🔥", "amy")]),
                message(2, Vec::new()),
            ]),
        };

        let report = run_scan(&state, &cancelling).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.messages_seen, 0);
        assert!(!state.is_scan_running());
        let last = state.with_db_read(|db| db.last_scan_run()).unwrap().unwrap();
        assert!(last.cancelled);

        let report = run_scan(&state, &cancelling.inner).await.unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.inserted, 2);
        assert_eq!(state.with_db_read(|db| db.get_agent_sales("amy")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_scan_rejected() {
        let state = test_state(Config::default());
        assert!(state.begin_scan());
        let err = run_scan(&state, &InMemorySource::default()).await.unwrap_err();
        assert!(matches!(err, LeadError::ScanInProgress));
        state.end_scan();
    }
}
