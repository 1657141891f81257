use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::*;
use crate::parser::NOT_AVAILABLE;
use crate::status::LeadStatus;

const LEAD_COLUMNS: &str = "external_id, name, phone, gender, age, zip_code, lead_type,
                            status, agent, created_at, status_changed_at";

impl LeadDb {
    // =========================================================================
    // Leads
    // =========================================================================

    /// Insert a lead on first sighting, otherwise update its status and agent.
    ///
    /// Demographic fields and `created_at` are written once and never
    /// overwritten. A call that carries the stored status and agent writes
    /// nothing, so repeated scans leave the table untouched. The agent's sales
    /// counter moves only on a genuine transition into `sold-booked`.
    pub fn upsert_lead(&self, lead: &LeadUpsert<'_>) -> Result<UpsertOutcome, DbError> {
        self.with_transaction(|db| db.upsert_lead_in_tx(lead))
    }

    fn upsert_lead_in_tx(&self, lead: &LeadUpsert<'_>) -> Result<UpsertOutcome, DbError> {
        let existing: Option<(LeadStatus, String)> = self
            .conn
            .query_row(
                "SELECT status, agent FROM leads WHERE external_id = ?1",
                params![lead.external_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now = timestamp(Utc::now());

        let kind = match existing {
            None => {
                let created_at = timestamp(lead.created_at);
                self.conn.execute(
                    "INSERT INTO leads (
                        external_id, name, phone, gender, age, zip_code, lead_type,
                        status, agent, created_at, status_changed_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        lead.external_id,
                        lead.draft.name,
                        lead.draft.phone,
                        lead.draft.gender,
                        lead.draft.age,
                        lead.draft.zip_code,
                        lead.draft.lead_type,
                        lead.status,
                        lead.agent,
                        created_at,
                    ],
                )?;
                UpsertKind::Inserted
            }
            Some((ref status, ref agent)) if *status == lead.status && agent == lead.agent => {
                UpsertKind::Unchanged
            }
            Some((status, _)) => {
                self.conn.execute(
                    "UPDATE leads
                     SET status = ?1,
                         agent = ?2,
                         status_changed_at = CASE
                             WHEN status = ?1 THEN status_changed_at
                             ELSE ?3
                         END
                     WHERE external_id = ?4",
                    params![lead.status, lead.agent, now, lead.external_id],
                )?;
                log::debug!(
                    "Lead {}: {} -> {} ({})",
                    lead.external_id,
                    status,
                    lead.status,
                    lead.agent
                );
                UpsertKind::Updated
            }
        };

        let previous_status = existing.map(|(status, _)| status);
        let sale_recorded = lead.status == LeadStatus::SoldBooked
            && previous_status != Some(LeadStatus::SoldBooked);
        if sale_recorded {
            self.increment_agent_sales(lead.agent)?;
        }

        Ok(UpsertOutcome {
            kind,
            previous_status,
            sale_recorded,
        })
    }

    /// Look up a lead by its external message id.
    pub fn get_lead(&self, external_id: i64) -> Result<Option<DbLead>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM leads WHERE external_id = ?1",
            LEAD_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![external_id], Self::map_lead_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recently created leads first.
    pub fn recent_leads(&self, limit: usize) -> Result<Vec<DbLead>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM leads ORDER BY created_at DESC, external_id DESC LIMIT ?1",
            LEAD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], Self::map_lead_row)?;
        let mut leads = Vec::new();
        for row in rows {
            leads.push(row?);
        }
        Ok(leads)
    }

    /// Every lead in external-id order.
    pub fn all_leads(&self) -> Result<Vec<DbLead>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM leads ORDER BY external_id",
            LEAD_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::map_lead_row)?;
        let mut leads = Vec::new();
        for row in rows {
            leads.push(row?);
        }
        Ok(leads)
    }

    // =========================================================================
    // Aggregation primitives
    // =========================================================================

    /// Count leads matching `filter`.
    pub fn count_leads(&self, filter: &LeadFilter) -> Result<i64, DbError> {
        let (clause, values) = filter.to_sql();
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM leads{}", clause),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count leads per distinct value of `column`.
    ///
    /// Groups come back in first-seen order (lowest row id first) so callers
    /// breaking ties on "first encountered" get a deterministic answer.
    pub fn group_count(
        &self,
        column: LeadColumn,
        filter: &LeadFilter,
    ) -> Result<Vec<(String, i64)>, DbError> {
        let (clause, values) = filter.to_sql();
        let col = column.column();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {col}, COUNT(*) FROM leads{clause} GROUP BY {col} ORDER BY MIN(id)"
        ))?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    /// Most frequent value of `column`, ties going to the first-seen value.
    ///
    /// The `N/A` sentinel and blanks mean "not provided" and never win.
    pub fn top_value(
        &self,
        column: LeadColumn,
        filter: &LeadFilter,
    ) -> Result<Option<(String, i64)>, DbError> {
        let mut best: Option<(String, i64)> = None;
        for (value, count) in self.group_count(column, filter)? {
            if value.trim().is_empty() || value == NOT_AVAILABLE {
                continue;
            }
            if best.as_ref().map_or(true, |(_, top)| count > *top) {
                best = Some((value, count));
            }
        }
        Ok(best)
    }

    /// Mean of the known ages, `None` when no lead has one.
    pub fn average_age(&self, filter: &LeadFilter) -> Result<Option<f64>, DbError> {
        let (clause, values) = filter.to_sql();
        let joiner = if clause.is_empty() { " WHERE" } else { " AND" };
        let avg = self.conn.query_row(
            &format!("SELECT AVG(age) FROM leads{clause}{joiner} age IS NOT NULL"),
            params_from_iter(values),
            |row| row.get::<_, Option<f64>>(0),
        )?;
        Ok(avg)
    }

    /// Creation instants of matching leads. Rows whose timestamp does not
    /// parse are skipped.
    pub fn lead_created_times(&self, filter: &LeadFilter) -> Result<Vec<DateTime<Utc>>, DbError> {
        let (clause, values) = filter.to_sql();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT created_at FROM leads{clause} ORDER BY id"))?;
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
        let mut times = Vec::new();
        for row in rows {
            let raw = row?;
            match parse_timestamp(&raw) {
                Some(at) => times.push(at),
                None => log::debug!("Skipping unparseable created_at {:?}", raw),
            }
        }
        Ok(times)
    }

    fn map_lead_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbLead> {
        Ok(DbLead {
            external_id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            gender: row.get(3)?,
            age: row.get(4)?,
            zip_code: row.get(5)?,
            lead_type: row.get(6)?,
            status: row.get(7)?,
            agent: row.get(8)?,
            created_at: row.get(9)?,
            status_changed_at: row.get(10)?,
        })
    }
}
