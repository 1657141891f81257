//! Lead store schema upgrades.
//!
//! Each step is a numbered SQL file compiled into the binary. `schema_version`
//! holds one row per step that has run.
//!
//! A store written by the earlier lead bot has `leads` and `agent_sales` but no
//! `schema_version`. Such a store is adopted at step 1, so only the later steps
//! run against it.

use rusqlite::Connection;

struct SchemaStep {
    version: i32,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        sql: include_str!("migrations/001_baseline.sql"),
    },
    SchemaStep {
        version: 2,
        sql: include_str!("migrations/002_status_tracking.sql"),
    },
];

fn latest_known() -> i32 {
    STEPS.iter().map(|step| step.version).max().unwrap_or(0)
}

fn applied_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Could not read schema_version: {}", e))
}

/// True when `leads` exists and holds at least one row.
fn has_legacy_leads(conn: &Connection) -> bool {
    conn.prepare("SELECT 1 FROM leads LIMIT 1")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false)
}

/// Record step 1 for an unversioned store that already has leads.
fn adopt_legacy_store(conn: &Connection) -> Result<(), String> {
    if applied_version(conn)? > 0 || !has_legacy_leads(conn) {
        return Ok(());
    }
    conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (1)", [])
        .map_err(|e| format!("Could not adopt legacy lead store: {}", e))?;
    log::info!("Adopted legacy lead store at schema v1");
    Ok(())
}

/// Copy the store to `<path>.pre-migration.bak` with SQLite's online backup.
/// In-memory stores are not copied.
fn snapshot_store(conn: &Connection) -> Result<(), String> {
    let path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Could not resolve lead store path: {}", e))?;
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }

    let target = format!("{}.pre-migration.bak", path);
    let mut dest =
        Connection::open(&target).map_err(|e| format!("Could not open {}: {}", target, e))?;
    rusqlite::backup::Backup::new(conn, &mut dest)
        .and_then(|backup| backup.step(-1).map(|_| ()))
        .map_err(|e| format!("Lead store snapshot to {} failed: {}", target, e))?;

    log::info!("Lead store snapshot written to {}", target);
    Ok(())
}

/// Bring the lead store up to the latest schema.
///
/// Returns how many steps ran. A store stamped with a version this build does
/// not know is left untouched and reported as an error. Each step and its
/// `schema_version` row commit together.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Could not create schema_version: {}", e))?;
    adopt_legacy_store(conn)?;

    let applied = applied_version(conn)?;
    let latest = latest_known();
    if applied > latest {
        return Err(format!(
            "Lead store is at schema v{} but this rocketlead build stops at v{}; upgrade rocketlead",
            applied, latest
        ));
    }
    if applied == latest {
        return Ok(0);
    }

    snapshot_store(conn)?;

    let mut ran = 0;
    for step in STEPS.iter().filter(|step| step.version > applied) {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| format!("Schema v{}: {}", step.version, e))?;
        tx.execute_batch(step.sql)
            .and_then(|_| {
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [step.version],
                )
            })
            .map_err(|e| format!("Schema v{} failed: {}", step.version, e))?;
        tx.commit()
            .map_err(|e| format!("Schema v{} commit failed: {}", step.version, e))?;
        log::info!("Lead store upgraded to schema v{}", step.version);
        ran += 1;
    }
    Ok(ran)
}
