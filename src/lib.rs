//! Efectivo - per-event cash day ledger
//!
//! One drawer record per (event, day): denomination counts for córdobas and
//! dollars, an append-only movement ledger, expected-vs-counted
//! reconciliation, a close that refuses any drawer off by a single centavo,
//! and an immutable versioned snapshot of every close. Everything persists
//! in a local SQLite database; there is no server authority.
//!
//! Typical host wiring:
//!
//! ```no_run
//! let _log_guard = efectivo::init_logging(None);
//! let db = efectivo::db::init(std::path::Path::new("./data")).expect("db");
//! let day = efectivo::today_key();
//! let record = efectivo::ensure(&db, "feria-agosto", &day).expect("cash day");
//! ```

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod cashday;
pub mod closeout;
pub mod db;
pub mod error;
pub mod events;
pub mod history;
pub mod money;
pub mod movements;
pub mod recon;
pub mod sales;

pub use cashday::{
    ensure, load, open_today_from_prev_closed, record_key, save, today_key, AuditEntry,
    CashDayRecord, DayStatus, DrawerCount, RecordMeta, RECORD_VERSION,
};
pub use closeout::{close_cash_day, reopen_cash_day, CloseOutcome, LiveTotals};
pub use db::DbState;
pub use error::{CashError, CashResult};
pub use events::EventInfo;
pub use history::{
    get_day_header, list_history, list_snapshot_versions, load_snapshot, DayHeader, EventHistory,
    HistoryDay, Snapshot, VersionEntry,
};
pub use money::{round_money, Currency, CurrencyCount};
pub use movements::{add_movement, Movement, MovementKind, MovementTotals};
pub use recon::{reconcile_day, reconcile_record, CurrencyRecon, DayRecon};

/// Initialize structured logging: console always, plus a daily-rolling JSON
/// file when a log directory is given. Call once at startup.
///
/// The returned guard flushes the file writer when dropped; the host should
/// hold it for the life of the process.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,efectivo=debug"));
    let console_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let file_appender = tracing_appender::rolling::daily(dir, "efectivo");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);
            registry.with(file_layer).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
