//! Error types for lead ingestion, reconciliation and reporting.
//!
//! Errors are classified by recoverability:
//! - Recoverable: a single message or metric failed; the caller skips it and
//!   carries on (scans degrade per message, dashboards per metric)
//! - Fatal for the current call: configuration problems, an unreachable
//!   message source, a database that cannot be opened

use thiserror::Error;

use crate::db::DbError;

/// Error types for the lead engine
#[derive(Debug, Error)]
pub enum LeadError {
    // Recoverable, per item
    #[error("Failed to parse lead message: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Store(#[from] DbError),

    // Fatal for the current call
    #[error("Message source error: {0}")]
    Source(String),

    #[error("Roster source error: {0}")]
    Roster(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("A reconciliation scan is already running")]
    ScanInProgress,
}

impl LeadError {
    /// Returns true if processing can continue with the next item.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LeadError::Parse(_) | LeadError::Store(_))
    }

    /// Get an operator-facing recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            LeadError::Parse(_) => "The message was skipped. Check its fields in the lead channel.",
            LeadError::Store(_) => "Check that the database file is writable and not locked.",
            LeadError::Source(_) => "Check the lead channel export or chat connection.",
            LeadError::Roster(_) => "Check the agent roster configuration.",
            LeadError::Config(_) => "Check your configuration in ~/.rocketlead/config.json",
            LeadError::Io(_) => "Check file permissions and disk space.",
            LeadError::ScanInProgress => "Wait for the running scan to finish, or cancel it.",
        }
    }
}

impl From<std::io::Error> for LeadError {
    fn from(err: std::io::Error) -> Self {
        LeadError::Io(err.to_string())
    }
}

/// Serializable error representation for the query surface
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub recoverable: bool,
    pub recovery_suggestion: String,
}

impl From<&LeadError> for ErrorPayload {
    fn from(err: &LeadError) -> Self {
        ErrorPayload {
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LeadError::Parse("bad".into()).is_recoverable());
        assert!(!LeadError::Source("down".into()).is_recoverable());
        assert!(!LeadError::ScanInProgress.is_recoverable());
    }

    #[test]
    fn test_payload_carries_suggestion() {
        let err = LeadError::Config("missing channel".into());
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.message, "Configuration error: missing channel");
        assert!(!payload.recoverable);
        assert!(payload.recovery_suggestion.contains("config.json"));
    }
}
