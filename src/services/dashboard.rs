// Dashboard service
// Metrics are computed on demand from the read-only connection. Each metric
// degrades on its own: a failed query logs and falls back to zero or N/A,
// the rest of the payload still renders.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::db::{timestamp, DbError, LeadColumn, LeadDb, LeadFilter};
use crate::parser::{LeadType, NOT_AVAILABLE};
use crate::state::AppState;
use crate::status::LeadStatus;
use crate::types::DashboardMetrics;

/// Width of the "hottest time" window, in hours.
const HOT_WINDOW_HOURS: u32 = 3;

/// Current dashboard for the whole store. Never fails.
pub fn get_dashboard_metrics(state: &AppState) -> DashboardMetrics {
    let tz = state.config().timezone();
    let now = Utc::now();
    match state.with_db_read(|db| Ok(compute_dashboard(db, tz, now))) {
        Ok(metrics) => metrics,
        Err(e) => {
            log::warn!("Dashboard: reader unavailable, returning empty metrics: {}", e);
            compute_from_counts(Counts::default(), now)
        }
    }
}

/// Unwrap one metric, logging and substituting `fallback` on failure.
fn metric<T>(name: &str, result: Result<T, DbError>, fallback: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Dashboard: {} unavailable: {}", name, e);
            fallback
        }
    }
}

#[derive(Default)]
struct Counts {
    total: i64,
    by_status: [i64; 5],
    hot: i64,
    warm: i64,
    quote_phish: i64,
}

impl Counts {
    fn status(&self, status: LeadStatus) -> i64 {
        LeadStatus::ALL
            .iter()
            .position(|s| *s == status)
            .map_or(0, |i| self.by_status[i])
    }
}

fn compute_from_counts(counts: Counts, now: DateTime<Utc>) -> DashboardMetrics {
    DashboardMetrics {
        total_leads: counts.total,
        called_leads: counts.status(LeadStatus::Called),
        sold_leads: counts.status(LeadStatus::SoldBooked),
        uncalled_leads: counts.status(LeadStatus::New),
        did_not_answer_leads: counts.status(LeadStatus::DidNotAnswer),
        do_not_call_leads: counts.status(LeadStatus::DoNotCall),
        hot_leads_count: counts.hot,
        warm_leads_count: counts.warm,
        quote_phish_leads_count: counts.quote_phish,
        closed_percentage: closed_percentage(counts.status(LeadStatus::SoldBooked), counts.total),
        average_age: None,
        popular_zip_code: NOT_AVAILABLE.to_string(),
        popular_gender: NOT_AVAILABLE.to_string(),
        hottest_time_window: NOT_AVAILABLE.to_string(),
        hour_histogram: vec![0; 24],
        generated_at: timestamp(now),
    }
}

pub(crate) fn compute_dashboard(db: &LeadDb, tz: Tz, now: DateTime<Utc>) -> DashboardMetrics {
    let all = LeadFilter::default();

    let mut counts = Counts {
        total: metric("total", db.count_leads(&all), 0),
        ..Counts::default()
    };
    let by_status = metric(
        "status counts",
        db.group_count(LeadColumn::Status, &all),
        Vec::new(),
    );
    for (i, status) in LeadStatus::ALL.iter().enumerate() {
        counts.by_status[i] = by_status
            .iter()
            .find(|(value, _)| value == status.as_str())
            .map_or(0, |(_, count)| *count);
    }
    counts.hot = metric(
        "hot leads",
        db.count_leads(&LeadFilter::lead_type(LeadType::Hot)),
        0,
    );
    counts.warm = metric(
        "warm leads",
        db.count_leads(&LeadFilter::lead_type(LeadType::Warm)),
        0,
    );
    counts.quote_phish = metric(
        "quote phish leads",
        db.count_leads(&LeadFilter::lead_type(LeadType::QuotePhish)),
        0,
    );

    let mut metrics = compute_from_counts(counts, now);

    metrics.average_age = metric("average age", db.average_age(&all), None)
        .map(|avg| (avg * 100.0).round() / 100.0);
    if let Some((zip, _)) = metric("popular zip", db.top_value(LeadColumn::ZipCode, &all), None) {
        metrics.popular_zip_code = zip;
    }
    if let Some((gender, _)) = metric("popular gender", db.top_value(LeadColumn::Gender, &all), None)
    {
        metrics.popular_gender = gender;
    }

    let times = metric("creation times", db.lead_created_times(&all), Vec::new());
    metrics.hour_histogram = hour_histogram(&times, tz);
    if let Some(hour) = busiest_hour(&metrics.hour_histogram) {
        metrics.hottest_time_window = window_label(hour);
    }

    metrics
}

/// Sold over total as a percentage with two decimals; 0 for an empty store.
pub fn closed_percentage(sold: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = sold as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Creation counts per local hour of day.
pub fn hour_histogram(times: &[DateTime<Utc>], tz: Tz) -> Vec<i64> {
    let mut buckets = vec![0i64; 24];
    for at in times {
        let hour = at.with_timezone(&tz).hour() as usize;
        buckets[hour] += 1;
    }
    buckets
}

/// Hour with the most creations; the earliest hour wins a tie.
pub fn busiest_hour(histogram: &[i64]) -> Option<u32> {
    let mut best: Option<(usize, i64)> = None;
    for (hour, count) in histogram.iter().enumerate() {
        if *count > 0 && best.map_or(true, |(_, top)| *count > top) {
            best = Some((hour, *count));
        }
    }
    best.map(|(hour, _)| hour as u32)
}

fn hour_label(hour: u32) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{} {}", display, suffix)
}

/// `3 PM - 6 PM` style label starting at `hour`, wrapping past midnight.
pub fn window_label(hour: u32) -> String {
    let start = hour % 24;
    let end = (start + HOT_WINDOW_HOURS) % 24;
    format!("{} - {}", hour_label(start), hour_label(end))
}
