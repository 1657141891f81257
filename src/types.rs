use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration stored in ~/.rocketlead/config.json.
///
/// Every field has a default so a missing or partial file still yields a
/// usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat channel whose message history holds the lead feed.
    #[serde(default)]
    pub lead_channel_id: u64,
    #[serde(default = "default_true")]
    pub scan_enabled: bool,
    #[serde(default = "default_scan_interval_minutes")]
    pub scan_interval_minutes: u32,
    /// Agents shown on the leaderboard even with no activity.
    #[serde(default)]
    pub known_agents: BTreeSet<String>,
    /// Reactions from these users never count, in addition to flagged bots.
    #[serde(default)]
    pub bot_users: BTreeSet<String>,
    /// IANA timezone used to bucket lead creation into hours of the day.
    #[serde(default = "default_report_timezone")]
    pub report_timezone: String,
    #[serde(default = "default_leaderboard_window_days")]
    pub leaderboard_window_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_scan_interval_minutes() -> u32 {
    60
}

fn default_report_timezone() -> String {
    "UTC".to_string()
}

fn default_leaderboard_window_days() -> u32 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lead_channel_id: 0,
            scan_enabled: true,
            scan_interval_minutes: default_scan_interval_minutes(),
            known_agents: BTreeSet::new(),
            bot_users: BTreeSet::new(),
            report_timezone: default_report_timezone(),
            leaderboard_window_days: default_leaderboard_window_days(),
            db_path: None,
        }
    }
}

impl Config {
    /// Parsed report timezone, falling back to UTC on an unknown name.
    pub fn timezone(&self) -> chrono_tz::Tz {
        match self.report_timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(e) => {
                log::warn!(
                    "Unknown report timezone {:?} ({}), using UTC",
                    self.report_timezone,
                    e
                );
                chrono_tz::UTC
            }
        }
    }
}

/// Dashboard payload. Insufficient data shows up as zeros, `null` or `"N/A"`,
/// never as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_leads: i64,
    pub called_leads: i64,
    pub sold_leads: i64,
    /// Leads still in `new`.
    pub uncalled_leads: i64,
    pub did_not_answer_leads: i64,
    pub do_not_call_leads: i64,
    pub hot_leads_count: i64,
    pub warm_leads_count: i64,
    pub quote_phish_leads_count: i64,
    /// Sold over total, as a percentage rounded to two places.
    pub closed_percentage: f64,
    pub average_age: Option<f64>,
    pub popular_zip_code: String,
    pub popular_gender: String,
    /// Three-hour label starting at the busiest creation hour, e.g. `3 PM - 6 PM`.
    pub hottest_time_window: String,
    /// Lead creations per hour of day (index 0 = midnight) in the report timezone.
    pub hour_histogram: Vec<i64>,
    pub generated_at: String,
}

/// Which slice of history a leaderboard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LeaderboardWindow {
    AllTime,
    TrailingDays { days: u32 },
}

impl LeaderboardWindow {
    pub fn trailing_week() -> Self {
        LeaderboardWindow::TrailingDays { days: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub agent: String,
    pub sales_count: i64,
    pub leads_called: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_gets_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"leadChannelId": 42, "knownAgents": ["amy"]}"#).unwrap();
        assert_eq!(config.lead_channel_id, 42);
        assert!(config.scan_enabled);
        assert_eq!(config.scan_interval_minutes, 60);
        assert_eq!(config.leaderboard_window_days, 7);
        assert!(config.known_agents.contains("amy"));
        assert_eq!(config.timezone(), chrono_tz::UTC);
    }

    #[test]
    fn test_bad_timezone_falls_back_to_utc() {
        let config = Config {
            report_timezone: "Mars/Olympus".to_string(),
            ..Config::default()
        };
        assert_eq!(config.timezone(), chrono_tz::UTC);

        let config = Config {
            report_timezone: "America/New_York".to_string(),
            ..Config::default()
        };
        assert_eq!(config.timezone(), chrono_tz::America::New_York);
    }
}
