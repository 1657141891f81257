// Query and submission surface over the shared AppState.
// Handlers in an HTTP or chat layer call these; they own no state themselves.

pub mod dashboard;
pub mod ingest;
pub mod leaderboard;

pub use dashboard::get_dashboard_metrics;
pub use ingest::{ingest, ingest_webhook};
pub use leaderboard::get_leaderboard;
