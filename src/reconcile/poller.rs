//! Background scan poller.
//!
//! Runs a reconciliation pass every `scanIntervalMinutes`, or sooner when
//! `AppState::scan_poller_wake` is notified. Config is re-read each cycle so
//! toggling `scanEnabled` takes effect without a restart.

use std::sync::Arc;
use std::time::Duration;

use crate::source::MessageSource;
use crate::state::AppState;

use super::scanner::run_scan;

/// How long a disabled poller sleeps before looking at the config again.
const DISABLED_RECHECK: Duration = Duration::from_secs(300);

pub async fn run_scan_poller(state: Arc<AppState>, source: Arc<dyn MessageSource>) {
    loop {
        let (enabled, interval_minutes) = {
            let config = state.config();
            (config.scan_enabled, config.scan_interval_minutes.max(1))
        };

        if !enabled {
            tokio::select! {
                _ = tokio::time::sleep(DISABLED_RECHECK) => {},
                _ = state.scan_poller_wake.notified() => {
                    log::info!("Scan poller: woken by signal (disabled path)");
                },
            }
            continue;
        }

        log::info!("Scan poller: starting reconciliation pass");
        match run_scan(&state, source.as_ref()).await {
            Ok(report) if report.cancelled => {
                log::info!("Scan poller: pass {} cancelled", report.run_id)
            }
            Ok(report) => log::info!(
                "Scan poller: pass {} reconciled {} messages",
                report.run_id,
                report.messages_seen
            ),
            Err(e) => log::warn!("Scan poller: pass failed: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval_minutes as u64 * 60)) => {},
            _ = state.scan_poller_wake.notified() => {
                log::info!("Scan poller: woken by manual scan signal");
            },
        }
    }
}
