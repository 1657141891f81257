use rusqlite::params;

use super::*;

impl LeadDb {
    // =========================================================================
    // Scan history
    // =========================================================================

    /// Record one reconciliation pass.
    pub fn insert_scan_run(&self, run: &DbScanRun) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO scan_runs (
                id, started_at, finished_at, messages_seen, inserted, updated,
                unchanged, skipped, sales_recorded, cancelled
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.id,
                run.started_at,
                run.finished_at,
                run.messages_seen,
                run.inserted,
                run.updated,
                run.unchanged,
                run.skipped,
                run.sales_recorded,
                run.cancelled as i32,
            ],
        )?;
        Ok(())
    }

    /// The most recent scans, newest first.
    pub fn recent_scan_runs(&self, limit: usize) -> Result<Vec<DbScanRun>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, messages_seen, inserted, updated,
                    unchanged, skipped, sales_recorded, cancelled
             FROM scan_runs
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(DbScanRun {
                id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                messages_seen: row.get(3)?,
                inserted: row.get(4)?,
                updated: row.get(5)?,
                unchanged: row.get(6)?,
                skipped: row.get(7)?,
                sales_recorded: row.get(8)?,
                cancelled: row.get::<_, i32>(9)? != 0,
            })
        })?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    pub fn last_scan_run(&self) -> Result<Option<DbScanRun>, DbError> {
        Ok(self.recent_scan_runs(1)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    fn run(id: &str, started_at: &str, cancelled: bool) -> DbScanRun {
        DbScanRun {
            id: id.to_string(),
            started_at: started_at.to_string(),
            finished_at: started_at.to_string(),
            messages_seen: 3,
            inserted: 1,
            updated: 1,
            unchanged: 1,
            skipped: 0,
            sales_recorded: 1,
            cancelled,
        }
    }

    #[test]
    fn test_last_scan_run() {
        let db = test_db();
        assert!(db.last_scan_run().unwrap().is_none());

        db.insert_scan_run(&run("a", "2025-01-01T00:00:00Z", false)).unwrap();
        db.insert_scan_run(&run("b", "2025-01-02T00:00:00Z", true)).unwrap();

        let last = db.last_scan_run().unwrap().expect("a scan was recorded");
        assert_eq!(last.id, "b");
        assert!(last.cancelled);
        assert_eq!(db.recent_scan_runs(10).unwrap().len(), 2);
    }
}
