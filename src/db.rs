//! Local SQLite storage layer for the cash subsystem.
//!
//! Uses rusqlite with WAL mode. Cash day records are stored as JSON blobs in
//! a `data` column, with the fields the queries need (status, timestamps)
//! mirrored into indexed columns. Provides schema migrations, settings
//! helpers, and the shared connection state used across all operations.

use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::error::{CashError, CashResult};

/// Shared state holding the database connection.
///
/// A single connection behind a mutex serializes all cash operations in this
/// process; `busy_timeout` covers contention from other processes on the same
/// file. `closing` tracks (event_id, day_key) pairs with a close in flight
/// so a second close of the same day fails fast instead of queueing behind
/// the first. Reopen takes no guard: it serializes on the connection and a
/// late duplicate fails its own closed-status check.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
    pub(crate) closing: Mutex<HashSet<(String, String)>>,
}

impl DbState {
    /// Acquire the connection, mapping a poisoned mutex to a storage error.
    pub fn lock_conn(&self) -> CashResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CashError::storage(format!("db lock: {e}")))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{data_dir}/efectivo.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas, and
/// runs any pending migrations. An unopenable file is reported as an error,
/// never repaired by deletion: the file holds the money ledger.
pub fn init(data_dir: &Path) -> CashResult<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| CashError::storage(format!("create data dir: {e}")))?;

    let db_path = data_dir.join("efectivo.db");
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
        closing: Mutex::new(HashSet::new()),
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> CashResult<Connection> {
    let conn =
        Connection::open(path).map_err(|e| CashError::storage(format!("sqlite open: {e}")))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| CashError::storage(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> CashResult<()> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| CashError::storage(format!("create schema_version: {e}")))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: settings store, events, and the sales feed.
fn migrate_v1(conn: &Connection) -> CashResult<()> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- events (ferias and other operating contexts)
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            closed_at TEXT,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- sales (feed the reconciliation reads; rows written at sale time)
        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            sale_date TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            total REAL NOT NULL DEFAULT 0,
            is_courtesy INTEGER DEFAULT 0,
            is_return INTEGER DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);
        CREATE INDEX IF NOT EXISTS idx_sales_event_date ON sales(event_id, sale_date);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        CashError::storage(format!("migration v1: {e}"))
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: cash day records, history headers, and close snapshots.
fn migrate_v2(conn: &Connection) -> CashResult<()> {
    conn.execute_batch(
        "
        -- cash_days: one active record per (event, day). The full record
        -- lives in `data` as JSON; status and timestamps are mirrored for
        -- indexed queries.
        CREATE TABLE IF NOT EXISTS cash_days (
            event_id TEXT NOT NULL,
            day_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'OPEN',
            open_ts INTEGER,
            close_ts INTEGER,
            data TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (event_id, day_key)
        );

        -- cash_day_history: one lightweight header per (event, day) for
        -- listings; `versions` is a JSON array of {v, ts, source} entries.
        CREATE TABLE IF NOT EXISTS cash_day_history (
            event_id TEXT NOT NULL,
            day_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'OPEN',
            open_ts INTEGER,
            close_ts INTEGER,
            versions TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (event_id, day_key)
        );

        -- cash_day_snapshots: immutable close snapshots, one row per close.
        -- The composite key makes a duplicate version a constraint error
        -- instead of a silent overwrite.
        CREATE TABLE IF NOT EXISTS cash_day_snapshots (
            event_id TEXT NOT NULL,
            day_key TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_ts INTEGER NOT NULL,
            data TEXT NOT NULL,
            PRIMARY KEY (event_id, day_key, version)
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_cash_days_event ON cash_days(event_id);
        CREATE INDEX IF NOT EXISTS idx_cash_days_day ON cash_days(day_key);
        CREATE INDEX IF NOT EXISTS idx_cash_day_snapshots_day ON cash_day_snapshots(event_id, day_key);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        CashError::storage(format!("migration v2: {e}"))
    })?;

    info!("Applied migration v2 (cash day tables)");
    Ok(())
}

/// Migration v3: per-day admin locks.
fn migrate_v3(conn: &Connection) -> CashResult<()> {
    conn.execute_batch(
        "
        -- day_locks: presence of a row means the (event, day) cannot be
        -- closed until an admin removes the lock.
        CREATE TABLE IF NOT EXISTS day_locks (
            event_id TEXT NOT NULL,
            day_key TEXT NOT NULL,
            locked_at TEXT DEFAULT (datetime('now')),
            reason TEXT,
            PRIMARY KEY (event_id, day_key)
        );

        -- Record migration
        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        CashError::storage(format!("migration v3: {e}"))
    })?;

    info!("Applied migration v3 (day_locks table)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> CashResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| CashError::storage(format!("set_setting: {e}")))?;
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

/// Wrap an in-memory connection in a `DbState` (test helper, not public API).
#[cfg(test)]
pub fn state_for_test(conn: Connection) -> DbState {
    DbState {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
        closing: Mutex::new(HashSet::new()),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
