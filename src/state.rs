use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::db::{DbError, LeadDb};
use crate::error::LeadError;
use crate::types::Config;

/// Application state shared by the ingest path, the scan poller and readers.
///
/// Writes go through `db` one upsert at a time. Dashboards and leaderboards
/// use `reader`, a read-only connection on the same WAL database, so they
/// never queue behind a running scan.
pub struct AppState {
    pub config: RwLock<Config>,
    db: Mutex<LeadDb>,
    reader: Mutex<LeadDb>,
    /// Wakes the scan poller ahead of its next interval.
    pub scan_poller_wake: Notify,
    scan_cancel: AtomicBool,
    scan_running: AtomicBool,
}

impl AppState {
    /// Open the database named by `config` (or the default path).
    pub fn open(config: Config) -> Result<Self, LeadError> {
        let path = match config.db_path.clone() {
            Some(p) => p,
            None => LeadDb::default_path()?,
        };
        Self::open_at(config, &path)
    }

    /// Open state on an explicit database path.
    pub fn open_at(config: Config, path: &Path) -> Result<Self, LeadError> {
        let writer = LeadDb::open_at(path.to_path_buf())?;
        let reader = LeadDb::open_readonly_at(path)?;
        log::info!("Lead database ready at {}", path.display());
        Ok(Self {
            config: RwLock::new(config),
            db: Mutex::new(writer),
            reader: Mutex::new(reader),
            scan_poller_wake: Notify::new(),
            scan_cancel: AtomicBool::new(false),
            scan_running: AtomicBool::new(false),
        })
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> Config {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run `f` against the writer connection. Hold it only for one unit of
    /// work (a single upsert), never across a whole scan.
    pub fn with_db_write<T>(
        &self,
        f: impl FnOnce(&LeadDb) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let guard = self.db.lock();
        f(&guard)
    }

    /// Run `f` against the read-only connection.
    pub fn with_db_read<T>(
        &self,
        f: impl FnOnce(&LeadDb) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let guard = self.reader.lock();
        f(&guard)
    }

    /// Ask a running scan to stop before its next message.
    pub fn request_scan_cancel(&self) {
        if self.scan_running.load(Ordering::SeqCst) {
            self.scan_cancel.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn scan_cancel_requested(&self) -> bool {
        self.scan_cancel.load(Ordering::SeqCst)
    }

    /// Mark a scan as started. Returns false if one is already running.
    pub(crate) fn begin_scan(&self) -> bool {
        if self
            .scan_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.scan_cancel.store(false, Ordering::SeqCst);
        true
    }

    pub(crate) fn end_scan(&self) {
        self.scan_cancel.store(false, Ordering::SeqCst);
        self.scan_running.store(false, Ordering::SeqCst);
    }

    pub fn is_scan_running(&self) -> bool {
        self.scan_running.load(Ordering::SeqCst)
    }
}

/// Resolve the config path: `$ROCKETLEAD_CONFIG` or `~/.rocketlead/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(custom) = std::env::var("ROCKETLEAD_CONFIG") {
        if !custom.trim().is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".rocketlead").join("config.json"))
}

/// Load configuration from the config path. A missing file yields defaults.
pub fn load_config() -> Result<Config, String> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!(
            "No config at {}, using defaults. Create it with: {{ \"leadChannelId\": 123 }}",
            path.display()
        );
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Reload configuration from disk into `state`.
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config()?;
    let mut guard = state.config.write().map_err(|_| "Lock poisoned")?;
    *guard = config.clone();
    Ok(config)
}
