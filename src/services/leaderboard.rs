// Leaderboard service
// Sales and calls per agent, all-time or over a trailing window, with every
// roster agent present even when idle.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::db::{DbError, LeadColumn, LeadDb, LeadFilter, UNKNOWN_AGENT};
use crate::source::RosterSource;
use crate::state::AppState;
use crate::status::LeadStatus;
use crate::types::{LeaderboardEntry, LeaderboardWindow};

/// Ranked leaderboard: sales descending, then agent name ascending.
///
/// A roster failure drops the zero-fill, a store failure drops the counts.
/// Neither fails the call.
pub async fn get_leaderboard(
    state: &AppState,
    roster: &dyn RosterSource,
    window: LeaderboardWindow,
) -> Vec<LeaderboardEntry> {
    let known = match roster.list_known_agents().await {
        Ok(agents) => agents,
        Err(e) => {
            log::warn!("Leaderboard: roster unavailable, skipping zero-fill: {}", e);
            Default::default()
        }
    };

    let mut rows: BTreeMap<String, (i64, i64)> =
        known.into_iter().map(|agent| (agent, (0, 0))).collect();

    match state.with_db_read(|db| agent_counts(db, window)) {
        Ok((sales, called)) => {
            for (agent, count) in sales {
                rows.entry(agent).or_default().0 += count;
            }
            for (agent, count) in called {
                rows.entry(agent).or_default().1 += count;
            }
        }
        Err(e) => log::warn!("Leaderboard: counts unavailable: {}", e),
    }
    rows.remove(UNKNOWN_AGENT);

    let mut entries: Vec<LeaderboardEntry> = rows
        .into_iter()
        .map(|(agent, (sales_count, leads_called))| LeaderboardEntry {
            agent,
            sales_count,
            leads_called,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.sales_count
            .cmp(&a.sales_count)
            .then_with(|| a.agent.cmp(&b.agent))
    });
    entries
}

type AgentCounts = Vec<(String, i64)>;

/// Start of a trailing window of `days`. `None` when the window reaches past
/// the earliest representable instant; such a window covers everything.
fn window_start(days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(days as i64).and_then(|span| Utc::now().checked_sub_signed(span))
}

/// (sales, calls) per agent for `window`.
///
/// All-time sales come from the counters, which keep sales a lead later
/// moved away from and stay with the agent who made the sale. Windowed sales
/// count the rows that entered `sold-booked` inside the window under their
/// current agent, so a sold lead re-attributed to another agent moves to
/// that agent in the windowed view only.
fn agent_counts(
    db: &LeadDb,
    window: LeaderboardWindow,
) -> Result<(AgentCounts, AgentCounts), DbError> {
    match window {
        LeaderboardWindow::AllTime => {
            let sales = db
                .list_agent_sales()?
                .into_iter()
                .map(|row| (row.agent, row.sales_count))
                .collect();
            let called = db.group_count(
                LeadColumn::Agent,
                &LeadFilter::status(LeadStatus::Called),
            )?;
            Ok((sales, called))
        }
        LeaderboardWindow::TrailingDays { days } => {
            let cutoff = window_start(days);
            let in_window = |filter: LeadFilter| match cutoff {
                Some(start) => filter.since(start),
                None => filter,
            };
            let sales = db.group_count(
                LeadColumn::Agent,
                &in_window(LeadFilter::status(LeadStatus::SoldBooked)),
            )?;
            let called = db.group_count(
                LeadColumn::Agent,
                &in_window(LeadFilter::status(LeadStatus::Called)),
            )?;
            Ok((sales, called))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;

    use super::*;
    use crate::db::LeadUpsert;
    use crate::error::LeadError;
    use crate::parser::{LeadDraft, LeadField};
    use crate::reconcile::run_scan;
    use crate::services::{get_dashboard_metrics, ingest};
    use crate::source::{InMemorySource, InboundMessage, Reaction, StaticRoster};
    use crate::state::test_utils::test_state;
    use crate::types::Config;

    fn seed(state: &AppState, id: i64, status: LeadStatus, agent: &str, days_ago: i64) {
        let draft = LeadDraft::default();
        state
            .with_db_write(|db| {
                db.upsert_lead(&LeadUpsert {
                    external_id: id,
                    draft: &draft,
                    status,
                    agent,
                    created_at: Utc::now() - Duration::days(days_ago),
                })
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_fill_and_ordering() {
        let state = test_state(Config::default());
        seed(&state, 1, LeadStatus::SoldBooked, "bob", 0);
        seed(&state, 2, LeadStatus::SoldBooked, "amy", 0);
        seed(&state, 3, LeadStatus::Called, "amy", 0);
        seed(&state, 4, LeadStatus::Called, "amy", 0);
        seed(&state, 5, LeadStatus::New, UNKNOWN_AGENT, 0);

        let roster = StaticRoster::new(["zed", "amy"]);
        let board = get_leaderboard(&state, &roster, LeaderboardWindow::AllTime).await;

        let summary: Vec<(&str, i64, i64)> = board
            .iter()
            .map(|e| (e.agent.as_str(), e.sales_count, e.leads_called))
            .collect();
        assert_eq!(summary, vec![("amy", 1, 2), ("bob", 1, 0), ("zed", 0, 0)]);
    }

    #[tokio::test]
    async fn test_trailing_window_excludes_old_sales() {
        let state = test_state(Config::default());
        seed(&state, 1, LeadStatus::SoldBooked, "amy", 30);
        seed(&state, 2, LeadStatus::SoldBooked, "bob", 1);
        seed(&state, 3, LeadStatus::Called, "amy", 30);

        let roster = StaticRoster::new(["amy", "bob"]);
        let week = get_leaderboard(&state, &roster, LeaderboardWindow::trailing_week()).await;
        assert_eq!(week[0].agent, "bob");
        assert_eq!(week[0].sales_count, 1);
        assert_eq!(week[1].agent, "amy");
        assert_eq!((week[1].sales_count, week[1].leads_called), (0, 0));

        let all = get_leaderboard(&state, &roster, LeaderboardWindow::AllTime).await;
        assert_eq!(all[0].agent, "amy");
        assert_eq!((all[0].sales_count, all[0].leads_called), (1, 1));
    }

    #[tokio::test]
    async fn test_oversized_window_covers_everything() {
        let state = test_state(Config::default());
        seed(&state, 1, LeadStatus::SoldBooked, "amy", 4000);
        seed(&state, 2, LeadStatus::Called, "amy", 4000);

        assert!(window_start(u32::MAX).is_none());
        let roster = StaticRoster::default();
        let board = get_leaderboard(
            &state,
            &roster,
            LeaderboardWindow::TrailingDays { days: u32::MAX },
        )
        .await;
        assert_eq!(
            board,
            vec![LeaderboardEntry {
                agent: "amy".to_string(),
                sales_count: 1,
                leads_called: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_reattributed_sale_differs_between_windows() {
        let state = test_state(Config::default());
        seed(&state, 1, LeadStatus::SoldBooked, "amy", 0);
        seed(&state, 1, LeadStatus::SoldBooked, "bob", 0);

        let roster = StaticRoster::default();
        let all = get_leaderboard(&state, &roster, LeaderboardWindow::AllTime).await;
        let all: Vec<(&str, i64)> = all.iter().map(|e| (e.agent.as_str(), e.sales_count)).collect();
        assert_eq!(all, vec![("amy", 1)]);

        let week = get_leaderboard(&state, &roster, LeaderboardWindow::trailing_week()).await;
        let week: Vec<(&str, i64)> = week.iter().map(|e| (e.agent.as_str(), e.sales_count)).collect();
        assert_eq!(week, vec![("bob", 1)]);
    }

    struct BrokenRoster;

    #[async_trait]
    impl RosterSource for BrokenRoster {
        async fn list_known_agents(&self) -> Result<BTreeSet<String>, LeadError> {
            Err(LeadError::Roster("directory offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_roster_failure_still_ranks() {
        let state = test_state(Config::default());
        seed(&state, 1, LeadStatus::SoldBooked, "amy", 0);
        let board = get_leaderboard(&state, &BrokenRoster, LeaderboardWindow::AllTime).await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].agent, "amy");
    }

    #[tokio::test]
    async fn test_ingest_then_scan_end_to_end() {
        let state = test_state(Config::default());
        let fields = vec![
            LeadField::new("name", "Jane Doe"),
            LeadField::new("phone", "555-1111"),
            LeadField::new("age", "34"),
            LeadField::new("zip", "30301"),
        ];
        ingest(&state, 1001, fields.clone(), Some("Hot Lead".to_string()), Vec::new()).unwrap();

        let metrics = get_dashboard_metrics(&state);
        assert_eq!(metrics.total_leads, 1);
        assert_eq!(metrics.hot_leads_count, 1);
        assert_eq!(metrics.uncalled_leads, 1);
        assert_eq!(metrics.closed_percentage, 0.0);
        assert_eq!(metrics.average_age, Some(34.0));

        let source = InMemorySource::new(vec![InboundMessage {
            id: Some(1001),
            channel_id: None,
            title: Some("Hot Lead".to_string()),
            fields,
            reactions: vec![Reaction::new("\u{1F525}", "agent7")],
            created_at: None,
        }]);
        run_scan(&state, &source).await.unwrap();

        let roster = StaticRoster::default();
        let board = get_leaderboard(&state, &roster, LeaderboardWindow::AllTime).await;
        assert_eq!(
            board,
            vec![LeaderboardEntry {
                agent: "agent7".to_string(),
                sales_count: 1,
                leads_called: 0,
            }]
        );
        assert_eq!(get_dashboard_metrics(&state).closed_percentage, 100.0);

        // Second scan over the same reactions changes nothing.
        let report = run_scan(&state, &source).await.unwrap();
        assert_eq!(report.unchanged, 1);
        let board = get_leaderboard(&state, &roster, LeaderboardWindow::AllTime).await;
        assert_eq!(board[0].sales_count, 1);
    }
}
