//! Collaborator interfaces the engine consumes.
//!
//! The chat gateway and the agent roster live outside this crate. The engine
//! only sees them through [`MessageSource`] and [`RosterSource`]. Adapters for
//! a JSON channel export, an in-memory feed and a static roster are provided.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::LeadError;
use crate::parser::LeadField;

/// One reaction by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub symbol: String,
    pub user: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Reaction {
    pub fn new(symbol: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            user: user.into(),
            is_bot: false,
        }
    }
}

/// A lead message as the chat gateway reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// External message id. Exports occasionally carry messages without one;
    /// those are skipped during a scan.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<LeadField>,
    /// In the order the gateway lists them, oldest first.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Replayable history of lead messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Every lead message in `channel_id`. Order only needs to be stable
    /// within one call.
    async fn list_messages(&self, channel_id: u64) -> Result<Vec<InboundMessage>, LeadError>;
}

/// Names of agents that belong on the leaderboard.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn list_known_agents(&self) -> Result<BTreeSet<String>, LeadError>;
}

fn in_channel(message: &InboundMessage, channel_id: u64) -> bool {
    message.channel_id.map_or(true, |c| c == channel_id)
}

// ---------------------------------------------------------------------------
// JSON export
// ---------------------------------------------------------------------------

/// Reads a channel export: a JSON array of [`InboundMessage`].
/// Messages tagged with a different `channelId` are ignored.
pub struct JsonExportSource {
    path: PathBuf,
}

impl JsonExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MessageSource for JsonExportSource {
    async fn list_messages(&self, channel_id: u64) -> Result<Vec<InboundMessage>, LeadError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            LeadError::Source(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let messages: Vec<InboundMessage> = serde_json::from_str(&content).map_err(|e| {
            LeadError::Source(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(messages
            .into_iter()
            .filter(|m| in_channel(m, channel_id))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// A message feed held in memory. Reactions can be changed between scans.
#[derive(Default)]
pub struct InMemorySource {
    messages: Mutex<Vec<InboundMessage>>,
}

impl InMemorySource {
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    pub fn push(&self, message: InboundMessage) {
        self.messages.lock().push(message);
    }

    /// Replace the reaction set of a message, as if moderators re-reacted.
    pub fn set_reactions(&self, id: i64, reactions: Vec<Reaction>) -> bool {
        let mut guard = self.messages.lock();
        match guard.iter_mut().find(|m| m.id == Some(id)) {
            Some(message) => {
                message.reactions = reactions;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn list_messages(&self, channel_id: u64) -> Result<Vec<InboundMessage>, LeadError> {
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| in_channel(m, channel_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Fixed roster, usually `Config::known_agents`.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    agents: BTreeSet<String>,
}

impl StaticRoster {
    pub fn new<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RosterSource for StaticRoster {
    async fn list_known_agents(&self) -> Result<BTreeSet<String>, LeadError> {
        Ok(self.agents.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_export_source_filters_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "title": "Hot Lead", "fields": [{"name": "Name", "value": "Jane"}],
                 "reactions": [{"symbol": "🔥", "user": "agent7"}]},
                {"id": 2, "channelId": 99},
                {"id": 3, "channelId": 5, "createdAt": "2025-01-01T15:30:00Z"}
            ]"#,
        )
        .unwrap();

        let source = JsonExportSource::new(&path);
        let messages = source.list_messages(5).await.unwrap();
        let ids: Vec<Option<i64>> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![Some(1), Some(3)]);
        assert_eq!(messages[0].reactions[0].user, "agent7");
        assert!(!messages[0].reactions[0].is_bot);
        assert!(messages[1].created_at.is_some());
    }

    #[tokio::test]
    async fn test_json_export_source_errors() {
        let missing = JsonExportSource::new("/nonexistent/export.json");
        assert!(matches!(
            missing.list_messages(1).await,
            Err(LeadError::Source(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let bad = JsonExportSource::new(&path);
        assert!(matches!(bad.list_messages(1).await, Err(LeadError::Source(_))));
    }

    #[tokio::test]
    async fn test_in_memory_set_reactions() {
        let source = InMemorySource::default();
        source.push(InboundMessage {
            id: Some(10),
            channel_id: None,
            title: None,
            fields: Vec::new(),
            reactions: Vec::new(),
            created_at: None,
        });
        assert!(source.set_reactions(10, vec![Reaction::new("✅", "amy")]));
        assert!(!source.set_reactions(11, Vec::new()));
        let messages = source.list_messages(0).await.unwrap();
        assert_eq!(messages[0].reactions.len(), 1);
    }

    #[tokio::test]
    async fn test_static_roster() {
        let roster = StaticRoster::new(["amy", "bob"]);
        let agents = roster.list_known_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert!(agents.contains("bob"));
    }
}
