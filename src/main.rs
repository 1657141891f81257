//! RocketLead command line.
//!
//! Reads `~/.rocketlead/config.json` (or `$ROCKETLEAD_CONFIG`), opens the lead
//! database and prints results as pretty JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde::Serialize;

use rocketlead_lib::reconcile::poller::run_scan_poller;
use rocketlead_lib::reconcile::run_scan;
use rocketlead_lib::services::{get_dashboard_metrics, get_leaderboard, ingest};
use rocketlead_lib::source::{JsonExportSource, MessageSource, StaticRoster};
use rocketlead_lib::state::{load_config, AppState};
use rocketlead_lib::types::LeaderboardWindow;

const USAGE: &str = "Usage: rocketlead <command>

Commands:
  scan <export.json>      Reconcile a channel export into the lead database
  ingest <export.json>    Submit each message of an export as a live lead
  watch <export.json>     Rescan the export every scanIntervalMinutes until Ctrl-C
  dashboard               Print dashboard metrics
  leaderboard [--week]    Print the agent leaderboard (all-time, or the trailing window)
  recent [limit]          Print the most recently created leads
  scans [limit]           Print recent scan history";

const DEFAULT_LIST_LIMIT: usize = 20;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn export_path(args: &[String]) -> anyhow::Result<PathBuf> {
    args.get(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing export path\n\n{USAGE}"))
}

fn list_limit(args: &[String]) -> anyhow::Result<usize> {
    match args.get(1) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid limit {raw:?}")),
        None => Ok(DEFAULT_LIST_LIMIT),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    ingested: usize,
    skipped: usize,
    sales_recorded: usize,
}

async fn ingest_export(state: &AppState, path: PathBuf) -> anyhow::Result<IngestSummary> {
    let channel = state.config().lead_channel_id;
    let messages = JsonExportSource::new(path).list_messages(channel).await?;
    let mut summary = IngestSummary {
        ingested: 0,
        skipped: 0,
        sales_recorded: 0,
    };
    for message in messages {
        let Some(id) = message.id else {
            log::warn!("Skipping export message without an id");
            summary.skipped += 1;
            continue;
        };
        match ingest(state, id, message.fields, message.title, message.reactions) {
            Ok(outcome) => {
                summary.ingested += 1;
                if outcome.sale_recorded {
                    summary.sales_recorded += 1;
                }
            }
            Err(e) => {
                log::warn!("Skipping message {}: {}", id, e);
                summary.skipped += 1;
            }
        }
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    if command == "help" || command == "--help" || command == "-h" {
        println!("{USAGE}");
        return Ok(());
    }

    let config = load_config().map_err(|e| anyhow!("Failed to load config: {e}"))?;
    let state = Arc::new(AppState::open(config).context("Failed to open lead database")?);

    match command.as_str() {
        "scan" => {
            let source = JsonExportSource::new(export_path(&args)?);
            let report = run_scan(&state, &source).await?;
            print_json(&report)?;
        }
        "ingest" => {
            let summary = ingest_export(&state, export_path(&args)?).await?;
            print_json(&summary)?;
        }
        "watch" => {
            let source: Arc<dyn MessageSource> =
                Arc::new(JsonExportSource::new(export_path(&args)?));
            let poller = tokio::spawn(run_scan_poller(state.clone(), source));
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            log::info!("Shutting down scan poller");
            state.request_scan_cancel();
            poller.abort();
        }
        "dashboard" => print_json(&get_dashboard_metrics(&state))?,
        "leaderboard" => {
            let config = state.config();
            let window = if args.iter().any(|a| a == "--week") {
                LeaderboardWindow::TrailingDays {
                    days: config.leaderboard_window_days,
                }
            } else {
                LeaderboardWindow::AllTime
            };
            let roster = StaticRoster::new(config.known_agents);
            print_json(&get_leaderboard(&state, &roster, window).await)?;
        }
        "recent" => {
            let limit = list_limit(&args)?;
            let leads = state.with_db_read(|db| db.recent_leads(limit))?;
            print_json(&leads)?;
        }
        "scans" => {
            let limit = list_limit(&args)?;
            let runs = state.with_db_read(|db| db.recent_scan_runs(limit))?;
            print_json(&runs)?;
        }
        other => bail!("Unknown command {other:?}\n\n{USAGE}"),
    }

    Ok(())
}
