//! Shared type definitions for the database layer.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::{LeadDraft, LeadType};
use crate::status::LeadStatus;

/// Agent recorded when no recognized reaction exists.
pub const UNKNOWN_AGENT: &str = "unknown";

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl ToSql for LeadStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LeadStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for LeadType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for LeadType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A row from the `leads` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLead {
    pub external_id: i64,
    pub name: String,
    pub phone: String,
    pub gender: String,
    pub age: Option<i64>,
    pub zip_code: String,
    pub lead_type: LeadType,
    pub status: LeadStatus,
    pub agent: String,
    pub created_at: String,
    pub status_changed_at: Option<String>,
}

impl DbLead {
    /// Demographic fields as a draft, for re-upserting a known lead.
    pub fn draft(&self) -> LeadDraft {
        LeadDraft {
            name: self.name.clone(),
            phone: self.phone.clone(),
            gender: self.gender.clone(),
            age: self.age,
            zip_code: self.zip_code.clone(),
            lead_type: self.lead_type,
        }
    }
}

/// A row from the `agent_sales` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAgentSales {
    pub agent: String,
    pub sales_count: i64,
}

/// A row from the `scan_runs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbScanRun {
    pub id: String,
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

/// Input to [`super::LeadDb::upsert_lead`].
///
/// `created_at` is only written when the row is new; demographic fields are
/// likewise ignored for existing rows.
#[derive(Debug, Clone)]
pub struct LeadUpsert<'a> {
    pub external_id: i64,
    pub draft: &'a LeadDraft,
    pub status: LeadStatus,
    pub agent: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    Inserted,
    Updated,
    Unchanged,
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub kind: UpsertKind,
    pub previous_status: Option<LeadStatus>,
    /// True when this call moved the lead into `sold-booked` and bumped the
    /// agent's sales counter.
    pub sale_recorded: bool,
}

/// Columns the aggregation queries may group on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadColumn {
    Status,
    LeadType,
    Agent,
    Gender,
    ZipCode,
}

impl LeadColumn {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            LeadColumn::Status => "status",
            LeadColumn::LeadType => "lead_type",
            LeadColumn::Agent => "agent",
            LeadColumn::Gender => "gender",
            LeadColumn::ZipCode => "zip_code",
        }
    }
}

/// Row predicate for counting and grouping. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub lead_type: Option<LeadType>,
    pub agent: Option<String>,
    /// Only rows whose status changed at or after this instant.
    pub changed_since: Option<DateTime<Utc>>,
}

impl LeadFilter {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn lead_type(lead_type: LeadType) -> Self {
        Self {
            lead_type: Some(lead_type),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.changed_since = Some(since);
        self
    }

    /// Build the `WHERE` clause and its positional parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<rusqlite::types::Value>) {
        use rusqlite::types::Value;

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = self.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(lead_type) = self.lead_type {
            values.push(Value::Text(lead_type.as_str().to_string()));
            clauses.push(format!("lead_type = ?{}", values.len()));
        }
        if let Some(ref agent) = self.agent {
            values.push(Value::Text(agent.clone()));
            clauses.push(format!("agent = ?{}", values.len()));
        }
        if let Some(since) = self.changed_since {
            values.push(Value::Text(crate::db::timestamp(since)));
            clauses.push(format!(
                "datetime(status_changed_at) >= datetime(?{})",
                values.len()
            ));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}
