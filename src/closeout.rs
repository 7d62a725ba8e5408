//! Close and reopen: the hard end of the day lifecycle.
//!
//! A close re-reads the record inside its own write transaction and decides
//! from that fresh copy, never from whatever the caller was looking at. All
//! of its writes — status flip, snapshot, history header — land in the one
//! transaction, so any reader sees either the fully closed day or the open
//! day, never something in between.
//!
//! The reconciliation rule is absolute: both currencies must reconcile to
//! exactly 0.00 or the close is rejected. There is no override.

use serde::Serialize;
use tracing::info;

use crate::cashday::{self, AuditEntry, CashDayRecord, DayStatus};
use crate::db::DbState;
use crate::error::{CashError, CashResult};
use crate::events;
use crate::history::{self, Snapshot, VersionEntry};
use crate::money::{round_money, Currency};
use crate::recon;
use crate::sales;

// ---------------------------------------------------------------------------
// In-process close guard
// ---------------------------------------------------------------------------

/// Marks (event, day) as having a close in flight; a second close of the
/// same day is rejected as busy instead of queueing behind the first.
/// Removal happens on drop, so an early return cannot leave the day stuck.
struct CloseGuard<'a> {
    db: &'a DbState,
    key: (String, String),
}

impl<'a> CloseGuard<'a> {
    fn acquire(db: &'a DbState, event_id: &str, day_key: &str) -> CashResult<CloseGuard<'a>> {
        let key = (event_id.to_string(), day_key.to_string());
        let mut closing = db
            .closing
            .lock()
            .map_err(|e| CashError::storage(e.to_string()))?;
        if !closing.insert(key.clone()) {
            return Err(CashError::busy("a close for this day is already running"));
        }
        Ok(CloseGuard { db, key })
    }
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut closing) = self.db.closing.lock() {
            closing.remove(&self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

/// Totals currently displayed by an attached UI. A close compares them to
/// the persisted record and refuses to run against unsaved edits.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveTotals {
    pub initial_nio: f64,
    pub initial_usd: f64,
    pub final_nio: f64,
    pub final_usd: f64,
}

impl LiveTotals {
    fn matches(&self, other: &LiveTotals) -> bool {
        round_money(self.initial_nio) == round_money(other.initial_nio)
            && round_money(self.initial_usd) == round_money(other.initial_usd)
            && round_money(self.final_nio) == round_money(other.final_nio)
            && round_money(self.final_usd) == round_money(other.final_usd)
    }
}

/// What a close attempt did.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    /// True when the day was already closed; nothing was written.
    pub already_closed: bool,
    /// Snapshot version written by this call.
    pub version: Option<u32>,
    pub close_ts: Option<i64>,
}

/// Close the cash day for (event, day).
///
/// Preconditions, checked against a fresh read inside the transaction: the
/// record exists and is not already closed (already closed is a no-op, not
/// an error); neither the event nor the day is locked; initial and final
/// counts are saved; the caller's live totals (if any) match the saved ones;
/// and both currencies reconcile to exactly 0.00 against a fresh sales scan.
///
/// On success the status flip, the immutable snapshot (version = 1 + the
/// highest version either the header or the stored rows know) and the
/// header update commit together. A validation failure writes nothing; an
/// infrastructure failure after the transaction opened reports the rollback
/// explicitly.
pub fn close_cash_day(
    db: &DbState,
    event_id: &str,
    day_key: &str,
    live: Option<&LiveTotals>,
) -> CashResult<CloseOutcome> {
    cashday::require_ids(event_id, day_key)?;
    let _guard = CloseGuard::acquire(db, event_id, day_key)?;

    let conn = db.lock_conn()?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(CashError::from)?;
    let result = (|| -> CashResult<CloseOutcome> {
        let Some(mut record) = cashday::load_normalized_conn(&conn, event_id, day_key)? else {
            return Err(CashError::validation("no cash day record to close"));
        };

        if record.status == DayStatus::Closed {
            return Ok(CloseOutcome {
                already_closed: true,
                version: None,
                close_ts: record.close_ts,
            });
        }
        if events::is_event_locked(&conn, event_id)? {
            return Err(CashError::validation(
                "event is closed; its cash days can no longer be changed",
            ));
        }
        if events::is_day_locked(&conn, event_id, day_key)? {
            return Err(CashError::validation("day is locked and cannot be closed"));
        }

        let Some(initial) = record.initial.as_ref() else {
            return Err(CashError::validation("initial count has not been saved"));
        };
        let Some(final_count) = record.final_count.as_ref() else {
            return Err(CashError::validation("final count has not been saved"));
        };

        if let Some(live) = live {
            let saved = LiveTotals {
                initial_nio: initial.nio.total,
                initial_usd: initial.usd.total,
                final_nio: final_count.nio.total,
                final_usd: final_count.usd.total,
            };
            if !live.matches(&saved) {
                return Err(CashError::validation(
                    "counts on screen differ from the saved record; save Initial/Final first",
                ));
            }
        }

        // The close decides on a fresh sales scan; a scan failure here must
        // block, not degrade to 0 like the display path does.
        let cash_sales = sales::cash_sales_local(&conn, event_id, day_key)?;
        record.cash_sales_c = cash_sales;
        let summary = recon::reconcile_record(&record, cash_sales);
        for (currency, line) in [(Currency::Nio, &summary.nio), (Currency::Usd, &summary.usd)] {
            if line.diff != 0.0 {
                return Err(CashError::validation(format!(
                    "{} does not reconcile: counted {:.2} against expected {:.2} (difference {:+.2})",
                    currency.code(),
                    line.counted,
                    line.expected,
                    line.diff,
                )));
            }
        }

        // Status flip, then snapshot, then header. Each step only runs once
        // the previous one has succeeded.
        let closed_ts = cashday::now_ms();
        let closed_iso = cashday::now_iso();
        record.status = DayStatus::Closed;
        record.close_ts = Some(closed_ts);
        record.meta.closed_at = Some(closed_iso.clone());
        record.meta.updated_at = closed_iso;
        cashday::persist_record_conn(&conn, &record)?;

        let version = history::next_snapshot_version(&conn, event_id, day_key)?;
        let snapshot = Snapshot::from_record(&record, &summary, version, closed_ts);
        history::insert_snapshot(&conn, &snapshot)?;

        history::upsert_day_header(&conn, &record)?;
        history::append_header_version(
            &conn,
            event_id,
            day_key,
            &VersionEntry {
                v: version,
                ts: closed_ts,
                source: "CLOSE".to_string(),
            },
        )?;

        Ok(CloseOutcome {
            already_closed: false,
            version: Some(version),
            close_ts: Some(closed_ts),
        })
    })();

    match result {
        Ok(outcome) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| CashError::tx_aborted("close", e.to_string()))?;
            if outcome.already_closed {
                info!(
                    event_id = %event_id,
                    day_key = %day_key,
                    "Close requested for an already closed day"
                );
            } else {
                info!(
                    event_id = %event_id,
                    day_key = %day_key,
                    version = outcome.version.unwrap_or(0),
                    "Cash day closed"
                );
            }
            Ok(outcome)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            if e.is_validation() {
                Err(e)
            } else {
                Err(CashError::tx_aborted("close", e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reopen
// ---------------------------------------------------------------------------

/// Reopen a closed day so the operator can correct it and close again.
///
/// Administrative: requires a non-empty reason, which lands in the record's
/// append-only audit trail. Counts, movements and existing snapshots are
/// untouched; the next close writes the next version. The audit append and
/// the status flip commit together or not at all.
pub fn reopen_cash_day(
    db: &DbState,
    event_id: &str,
    day_key: &str,
    reason: &str,
) -> CashResult<CashDayRecord> {
    cashday::require_ids(event_id, day_key)?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CashError::validation("a reason is required to reopen a day"));
    }

    let conn = db.lock_conn()?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(CashError::from)?;
    let result = (|| -> CashResult<CashDayRecord> {
        let Some(mut record) = cashday::load_normalized_conn(&conn, event_id, day_key)? else {
            return Err(CashError::validation("no cash day record to reopen"));
        };
        if events::is_event_locked(&conn, event_id)? {
            return Err(CashError::validation(
                "event is closed; its cash days can no longer be changed",
            ));
        }
        if record.status != DayStatus::Closed {
            return Err(CashError::validation("can only reopen a closed day"));
        }

        record.audit.push(AuditEntry {
            ts: cashday::now_ms(),
            action: "ADMIN_REOPEN".to_string(),
            reason: reason.to_string(),
            day_key: day_key.to_string(),
            event_id: event_id.to_string(),
        });
        record.status = DayStatus::Open;
        record.close_ts = None;
        record.meta.closed_at = None;
        record.meta.updated_at = cashday::now_iso();

        cashday::persist_record_conn(&conn, &record)?;
        history::upsert_day_header(&conn, &record)?;
        Ok(record)
    })();

    match result {
        Ok(record) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| CashError::tx_aborted("reopen", e.to_string()))?;
            info!(
                event_id = %event_id,
                day_key = %day_key,
                reason = %reason,
                "Cash day reopened"
            );
            Ok(record)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            if e.is_validation() {
                Err(e)
            } else {
                Err(CashError::tx_aborted("reopen", e.to_string()))
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cashday::DrawerCount;
    use crate::db;
    use crate::movements::{self, MovementKind};
    use rusqlite::{params, Connection, OptionalExtension};
    use serde_json::json;

    const EV: &str = "ev1";
    const DAY: &str = "2024-06-01";

    fn test_state() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        db::state_for_test(conn)
    }

    fn add_cash_sale(db: &DbState, id: &str, total: f64) {
        let conn = db.lock_conn().unwrap();
        conn.execute(
            "INSERT INTO sales (id, event_id, sale_date, payment_method, total)
             VALUES (?1, ?2, ?3, 'cash', ?4)",
            params![id, EV, DAY, total],
        )
        .expect("insert sale");
    }

    fn drawer(nio_counts: serde_json::Value, usd_counts: serde_json::Value) -> DrawerCount {
        DrawerCount::from_raw(&json!({
            "NIO": {"denomCounts": nio_counts},
            "USD": {"denomCounts": usd_counts},
        }))
    }

    /// Balanced day: initial NIO 500 / USD 40, cash sales 1000,
    /// final NIO 1500 / USD 40.
    fn seed_balanced_day(db: &DbState) {
        let mut record = cashday::ensure(db, EV, DAY).expect("ensure");
        record.initial = Some(drawer(json!({"500": 1}), json!({"20": 2})));
        let mut record = cashday::save(db, record).expect("save initial");

        add_cash_sale(db, "s1", 1000.0);

        record.final_count = Some(drawer(json!({"1000": 1, "500": 1}), json!({"20": 2})));
        cashday::save(db, record).expect("save final");
    }

    fn load_record(db: &DbState) -> CashDayRecord {
        cashday::load(db, EV, DAY).expect("load").expect("exists")
    }

    fn snapshot_row_count(db: &DbState) -> i64 {
        let conn = db.lock_conn().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM cash_day_snapshots WHERE event_id = ?1 AND day_key = ?2",
            params![EV, DAY],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn raw_snapshot(db: &DbState, version: u32) -> Option<String> {
        let conn = db.lock_conn().unwrap();
        conn.query_row(
            "SELECT data FROM cash_day_snapshots
             WHERE event_id = ?1 AND day_key = ?2 AND version = ?3",
            params![EV, DAY, version],
            |row| row.get(0),
        )
        .optional()
        .unwrap()
    }

    #[test]
    fn test_close_happy_path_writes_v1() {
        let db = test_state();
        seed_balanced_day(&db);

        let outcome = close_cash_day(&db, EV, DAY, None).expect("close");
        assert!(!outcome.already_closed);
        assert_eq!(outcome.version, Some(1));
        assert!(outcome.close_ts.is_some());

        let record = load_record(&db);
        assert_eq!(record.status, DayStatus::Closed);
        assert_eq!(record.close_ts, outcome.close_ts);
        assert!(record.meta.closed_at.is_some());
        assert_eq!(record.cash_sales_c, 1000.0, "sales cache refreshed at close");

        let snap = history::load_snapshot(&db, EV, DAY, 1)
            .expect("load")
            .expect("written");
        assert_eq!(snap.currencies.nio.expected, 1500.0);
        assert_eq!(snap.currencies.nio.diff, 0.0);
        assert_eq!(snap.currencies.usd.expected, 40.0);
        assert_eq!(snap.cash_sales_c, 1000.0);
        assert_eq!(snap.source, "CLOSE");

        let header = history::get_day_header(&db, EV, DAY)
            .expect("get")
            .expect("exists");
        assert_eq!(header.status, DayStatus::Closed);
        assert_eq!(header.versions.len(), 1);
        assert_eq!(header.versions[0].v, 1);
        assert_eq!(header.versions[0].source, "CLOSE");
    }

    #[test]
    fn test_close_blocked_by_nonzero_diff_writes_nothing() {
        let db = test_state();
        seed_balanced_day(&db);
        // Another 50 of sales makes the drawer 50 short
        add_cash_sale(&db, "s2", 50.0);

        let err = close_cash_day(&db, EV, DAY, None).expect_err("must block");
        assert!(err.is_validation());
        assert!(err.to_string().contains("NIO"), "names the currency: {err}");
        assert!(err.to_string().contains("-50.00"), "names the amount: {err}");

        let record = load_record(&db);
        assert_eq!(record.status, DayStatus::Open, "status unchanged");
        assert!(record.close_ts.is_none());
        assert_eq!(snapshot_row_count(&db), 0, "no snapshot written");
        let header = history::get_day_header(&db, EV, DAY)
            .expect("get")
            .expect("exists from earlier saves");
        assert!(header.versions.is_empty(), "no version recorded");
    }

    #[test]
    fn test_close_blocked_by_usd_diff() {
        let db = test_state();
        let mut record = cashday::ensure(&db, EV, DAY).expect("ensure");
        record.initial = Some(drawer(json!({}), json!({"20": 2})));
        let mut record = cashday::save(&db, record).expect("save initial");
        record.final_count = Some(drawer(json!({}), json!({"20": 1})));
        cashday::save(&db, record).expect("save final");

        let err = close_cash_day(&db, EV, DAY, None).expect_err("must block");
        assert!(err.to_string().contains("USD"), "names USD: {err}");
    }

    #[test]
    fn test_close_is_idempotent() {
        let db = test_state();
        seed_balanced_day(&db);

        close_cash_day(&db, EV, DAY, None).expect("first close");
        let second = close_cash_day(&db, EV, DAY, None).expect("second close");
        assert!(second.already_closed);
        assert_eq!(second.version, None);
        assert!(second.close_ts.is_some(), "reports when the day closed");
        assert_eq!(snapshot_row_count(&db), 1, "exactly one snapshot");
    }

    #[test]
    fn test_close_requires_saved_counts() {
        let db = test_state();
        cashday::ensure(&db, EV, DAY).expect("ensure");

        let err = close_cash_day(&db, EV, DAY, None).expect_err("no initial");
        assert!(err.to_string().contains("initial count"), "{err}");

        let mut record = load_record(&db);
        record.initial = Some(drawer(json!({}), json!({})));
        cashday::save(&db, record).expect("save initial");

        let err = close_cash_day(&db, EV, DAY, None).expect_err("no final");
        assert!(err.to_string().contains("final count"), "{err}");
    }

    #[test]
    fn test_close_missing_record() {
        let db = test_state();
        let err = close_cash_day(&db, EV, DAY, None).expect_err("nothing to close");
        assert!(err.is_validation());
        assert!(err.to_string().contains("no cash day record"), "{err}");
    }

    #[test]
    fn test_close_blocked_by_unsaved_edits() {
        let db = test_state();
        seed_balanced_day(&db);

        // Screen shows a final total the record does not have
        let live = LiveTotals {
            initial_nio: 500.0,
            initial_usd: 40.0,
            final_nio: 1490.0,
            final_usd: 40.0,
        };
        let err = close_cash_day(&db, EV, DAY, Some(&live)).expect_err("must block");
        assert!(err.to_string().contains("save Initial/Final first"), "{err}");
        assert_eq!(load_record(&db).status, DayStatus::Open);

        // Matching totals close fine
        let live = LiveTotals {
            final_nio: 1500.0,
            ..live
        };
        let outcome = close_cash_day(&db, EV, DAY, Some(&live)).expect("close");
        assert_eq!(outcome.version, Some(1));
    }

    #[test]
    fn test_close_blocked_by_event_lock() {
        let db = test_state();
        seed_balanced_day(&db);
        events::upsert_event(&db, EV, "Feria Agosto").expect("event");
        events::set_event_closed(&db, EV, true).expect("lock");

        let err = close_cash_day(&db, EV, DAY, None).expect_err("must block");
        assert!(err.is_validation());
        assert!(err.to_string().contains("event is closed"), "{err}");

        events::set_event_closed(&db, EV, false).expect("unlock");
        close_cash_day(&db, EV, DAY, None).expect("closes after unlock");
    }

    #[test]
    fn test_close_blocked_by_day_lock() {
        let db = test_state();
        seed_balanced_day(&db);
        events::set_day_lock(&db, EV, DAY, true, Some("inventario")).expect("lock");

        let err = close_cash_day(&db, EV, DAY, None).expect_err("must block");
        assert!(err.to_string().contains("day is locked"), "{err}");

        events::set_day_lock(&db, EV, DAY, false, None).expect("unlock");
        close_cash_day(&db, EV, DAY, None).expect("closes after unlock");
    }

    #[test]
    fn test_concurrent_close_is_busy() {
        let db = test_state();
        seed_balanced_day(&db);

        // Simulate a close already in flight for this day
        db.closing
            .lock()
            .unwrap()
            .insert((EV.to_string(), DAY.to_string()));
        let err = close_cash_day(&db, EV, DAY, None).expect_err("must be busy");
        assert!(err.is_busy());
        db.closing.lock().unwrap().clear();

        // Guard released cleanly after a normal close too
        close_cash_day(&db, EV, DAY, None).expect("close");
        assert!(db.closing.lock().unwrap().is_empty());
    }

    #[test]
    fn test_guard_released_after_failed_close() {
        let db = test_state();
        cashday::ensure(&db, EV, DAY).expect("ensure");

        close_cash_day(&db, EV, DAY, None).expect_err("no counts saved");
        assert!(
            db.closing.lock().unwrap().is_empty(),
            "guard must not leak on the error path"
        );
    }

    #[test]
    fn test_reopen_requires_reason() {
        let db = test_state();
        seed_balanced_day(&db);
        close_cash_day(&db, EV, DAY, None).expect("close");

        for reason in ["", "   "] {
            let err = reopen_cash_day(&db, EV, DAY, reason).expect_err("must require reason");
            assert!(err.to_string().contains("reason is required"), "{err}");
        }
        assert_eq!(load_record(&db).status, DayStatus::Closed);
    }

    #[test]
    fn test_reopen_only_closed_day() {
        let db = test_state();
        cashday::ensure(&db, EV, DAY).expect("ensure");

        let err = reopen_cash_day(&db, EV, DAY, "conteo equivocado").expect_err("open day");
        assert!(err.to_string().contains("can only reopen a closed day"), "{err}");
    }

    #[test]
    fn test_reopen_appends_audit_and_keeps_everything_else() {
        let db = test_state();
        seed_balanced_day(&db);
        close_cash_day(&db, EV, DAY, None).expect("close");

        let record = reopen_cash_day(&db, EV, DAY, "billete de 500 mal contado").expect("reopen");
        assert_eq!(record.status, DayStatus::Open);
        assert!(record.close_ts.is_none());
        assert!(record.meta.closed_at.is_none());
        assert_eq!(record.audit.len(), 1);
        assert_eq!(record.audit[0].action, "ADMIN_REOPEN");
        assert_eq!(record.audit[0].reason, "billete de 500 mal contado");
        assert_eq!(record.audit[0].day_key, DAY);
        assert_eq!(record.audit[0].event_id, EV);

        // Counts and snapshots survive the reopen
        assert!(record.initial.is_some());
        assert!(record.final_count.is_some());
        assert_eq!(snapshot_row_count(&db), 1);

        let header = history::get_day_header(&db, EV, DAY)
            .expect("get")
            .expect("exists");
        assert_eq!(header.status, DayStatus::Open);
        assert_eq!(header.versions.len(), 1, "version list untouched by reopen");
    }

    #[test]
    fn test_reopen_blocked_by_event_lock() {
        let db = test_state();
        seed_balanced_day(&db);
        close_cash_day(&db, EV, DAY, None).expect("close");
        events::upsert_event(&db, EV, "Feria Agosto").expect("event");
        events::set_event_closed(&db, EV, true).expect("lock");

        let err = reopen_cash_day(&db, EV, DAY, "ajuste").expect_err("must block");
        assert!(err.to_string().contains("event is closed"), "{err}");
    }

    #[test]
    fn test_close_reopen_close_preserves_v1_and_appends_v2() {
        let db = test_state();
        seed_balanced_day(&db);

        close_cash_day(&db, EV, DAY, None).expect("first close");
        let v1_before = raw_snapshot(&db, 1).expect("v1 stored");

        reopen_cash_day(&db, EV, DAY, "faltó registrar un préstamo").expect("reopen");

        // Correct the day: 100 more came in, drawer now holds 1600
        movements::add_movement(
            &db,
            EV,
            DAY,
            MovementKind::In,
            Currency::Nio,
            100.0,
            Some("préstamo devuelto".to_string()),
        )
        .expect("movement");
        let mut record = load_record(&db);
        record.final_count = Some(drawer(
            json!({"1000": 1, "500": 1, "100": 1}),
            json!({"20": 2}),
        ));
        cashday::save(&db, record).expect("save corrected final");

        let outcome = close_cash_day(&db, EV, DAY, None).expect("second close");
        assert_eq!(outcome.version, Some(2));

        // v1 is byte-for-byte what it was before the reopen cycle
        assert_eq!(raw_snapshot(&db, 1).expect("v1 still stored"), v1_before);

        let versions = history::list_snapshot_versions(&db, EV, DAY).expect("list");
        assert_eq!(versions, vec![1, 2]);

        let v2 = history::load_snapshot(&db, EV, DAY, 2)
            .expect("load")
            .expect("written");
        assert_eq!(v2.currencies.nio.expected, 1600.0);
        assert_eq!(v2.currencies.nio.sums.inflow, 100.0);
        assert_eq!(v2.audit.len(), 1, "reopen audit is frozen into v2");
        assert_eq!(v2.audit[0].action, "ADMIN_REOPEN");
    }

    #[test]
    fn test_each_reopen_cycle_adds_one_audit_entry() {
        let db = test_state();
        seed_balanced_day(&db);

        close_cash_day(&db, EV, DAY, None).expect("first close");
        reopen_cash_day(&db, EV, DAY, "conteo revisado").expect("first reopen");

        // Nothing changed, so the day still reconciles and closes again
        let outcome = close_cash_day(&db, EV, DAY, None).expect("second close");
        assert_eq!(outcome.version, Some(2));
        reopen_cash_day(&db, EV, DAY, "ajuste de última hora").expect("second reopen");

        let record = load_record(&db);
        assert_eq!(record.status, DayStatus::Open);
        assert_eq!(record.audit.len(), 2, "one audit entry per reopen");
        assert_eq!(record.audit[0].reason, "conteo revisado");
        assert_eq!(record.audit[1].reason, "ajuste de última hora");
        assert!(record.audit.iter().all(|a| a.action == "ADMIN_REOPEN"));

        let versions = history::list_snapshot_versions(&db, EV, DAY).expect("list");
        assert_eq!(versions, vec![1, 2]);
        assert_eq!(snapshot_row_count(&db), 2);
    }

    #[test]
    fn test_edits_after_reopen_still_guarded_by_save() {
        let db = test_state();
        seed_balanced_day(&db);
        close_cash_day(&db, EV, DAY, None).expect("close");

        // A plain save cannot touch the closed record
        let mut record = load_record(&db);
        record.cash_sales_c = 0.0;
        let err = cashday::save(&db, record).expect_err("closed day rejects saves");
        assert!(err.to_string().contains("reopen"), "{err}");
    }
}
