//! Day headers and immutable close snapshots.
//!
//! Two stores back the history screens. `cash_day_history` holds one
//! lightweight header per (event, day) — status, open/close timestamps and
//! the list of snapshot versions — kept current on every record write so an
//! OPEN day is listable before it has ever been closed. `cash_day_snapshots`
//! holds one frozen copy of the fully computed day per successful close,
//! versioned from 1 and never overwritten.
//!
//! The header's version list is a cache; the snapshot rows are the truth.
//! Listing takes the union of both and heals the header when the rows know
//! more, so an interrupted write in an imported database cannot hide a
//! snapshot.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cashday::{AuditEntry, CashDayRecord, DayStatus};
use crate::db::DbState;
use crate::error::{CashError, CashResult};
use crate::money::{Currency, CurrencyCount};
use crate::movements::{sum_movements_by_currency, Movement, MovementTotals};
use crate::recon::DayRecon;

pub fn header_key(event_id: &str, day_key: &str) -> String {
    format!("cashv2hist:{event_id}:{day_key}")
}

pub fn snapshot_key(event_id: &str, day_key: &str, version: u32) -> String {
    format!("cashv2snap:{event_id}:{day_key}:v{version}")
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One entry in a header's version list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub v: u32,
    pub ts: i64,
    pub source: String,
}

/// Per-day history header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayHeader {
    pub key: String,
    pub event_id: String,
    pub day_key: String,
    pub status: DayStatus,
    pub open_ts: Option<i64>,
    pub close_ts: Option<i64>,
    pub versions: Vec<VersionEntry>,
    pub updated_at: String,
}

/// One currency's frozen slice of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCurrency {
    pub initial: CurrencyCount,
    pub movements: Vec<Movement>,
    pub sums: MovementTotals,
    pub expected: f64,
    pub final_count: CurrencyCount,
    pub diff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCurrencies {
    #[serde(rename = "NIO")]
    pub nio: SnapshotCurrency,
    #[serde(rename = "USD")]
    pub usd: SnapshotCurrency,
}

/// Frozen copy of a day as it stood at close. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub key: String,
    pub event_id: String,
    pub day_key: String,
    pub version: u32,
    pub ts: i64,
    pub source: String,
    pub open_ts: i64,
    pub close_ts: Option<i64>,
    pub fx: Option<f64>,
    pub currencies: SnapshotCurrencies,
    #[serde(rename = "cashSalesC")]
    pub cash_sales_c: f64,
    pub audit: Vec<AuditEntry>,
}

impl Snapshot {
    /// Freeze a record and its reconciliation summary into snapshot form.
    pub(crate) fn from_record(
        record: &CashDayRecord,
        summary: &DayRecon,
        version: u32,
        ts: i64,
    ) -> Snapshot {
        Snapshot {
            key: snapshot_key(&record.event_id, &record.day_key, version),
            event_id: record.event_id.clone(),
            day_key: record.day_key.clone(),
            version,
            ts,
            source: "CLOSE".to_string(),
            open_ts: record.open_ts,
            close_ts: record.close_ts,
            fx: record.fx,
            currencies: SnapshotCurrencies {
                nio: freeze_currency(record, Currency::Nio, summary.nio.expected, summary.nio.diff),
                usd: freeze_currency(record, Currency::Usd, summary.usd.expected, summary.usd.diff),
            },
            cash_sales_c: summary.cash_sales_c,
            audit: record.audit.clone(),
        }
    }
}

fn freeze_currency(
    record: &CashDayRecord,
    currency: Currency,
    expected: f64,
    diff: f64,
) -> SnapshotCurrency {
    let initial = record
        .initial
        .as_ref()
        .map(|c| c.get(currency).clone())
        .unwrap_or_else(|| CurrencyCount::zero(currency));
    let final_count = record
        .final_count
        .as_ref()
        .map(|c| c.get(currency).clone())
        .unwrap_or_else(|| CurrencyCount::zero(currency));
    let movements: Vec<Movement> = record
        .movements
        .iter()
        .filter(|m| m.currency == currency)
        .cloned()
        .collect();
    let sums = sum_movements_by_currency(&record.movements, currency);

    SnapshotCurrency {
        initial,
        movements,
        sums,
        expected,
        final_count,
        diff,
    }
}

// ---------------------------------------------------------------------------
// Day headers
// ---------------------------------------------------------------------------

/// Bring the header row in line with a record's status and timestamps.
/// The version list is deliberately left alone; only a close appends to it.
pub(crate) fn upsert_day_header(conn: &Connection, record: &CashDayRecord) -> CashResult<()> {
    conn.execute(
        "INSERT INTO cash_day_history (event_id, day_key, status, open_ts, close_ts, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(event_id, day_key) DO UPDATE SET
            status = excluded.status,
            open_ts = excluded.open_ts,
            close_ts = excluded.close_ts,
            updated_at = excluded.updated_at",
        params![
            record.event_id,
            record.day_key,
            record.status.code(),
            record.open_ts,
            record.close_ts
        ],
    )?;
    Ok(())
}

/// Append a version entry to the header's list unless that version is
/// already recorded. The caller owns the transaction.
pub(crate) fn append_header_version(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
    entry: &VersionEntry,
) -> CashResult<()> {
    let mut versions = header_versions_conn(conn, event_id, day_key)?;
    if versions.iter().any(|e| e.v == entry.v) {
        return Ok(());
    }
    versions.push(entry.clone());
    versions.sort_by_key(|e| e.v);
    write_header_versions(conn, event_id, day_key, &versions)
}

fn write_header_versions(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
    versions: &[VersionEntry],
) -> CashResult<()> {
    let json = serde_json::to_string(versions)
        .map_err(|e| CashError::storage(format!("serialize version list: {e}")))?;
    let changed = conn.execute(
        "UPDATE cash_day_history
         SET versions = ?3, updated_at = datetime('now')
         WHERE event_id = ?1 AND day_key = ?2",
        params![event_id, day_key, json],
    )?;
    if changed == 0 {
        // Snapshots without a header row only happen in imported data; a
        // snapshot implies the day closed at some point.
        conn.execute(
            "INSERT INTO cash_day_history (event_id, day_key, status, versions, updated_at)
             VALUES (?1, ?2, 'CLOSED', ?3, datetime('now'))",
            params![event_id, day_key, json],
        )?;
    }
    Ok(())
}

/// Read a header's version list, tolerating malformed JSON (treated as
/// empty with a warning) and malformed entries (skipped). The snapshot rows
/// remain the authoritative source either way.
fn header_versions_conn(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
) -> CashResult<Vec<VersionEntry>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT versions FROM cash_day_history WHERE event_id = ?1 AND day_key = ?2",
            params![event_id, day_key],
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    Ok(parse_version_entries(&raw, event_id, day_key))
}

fn parse_version_entries(raw: &str, event_id: &str, day_key: &str) -> Vec<VersionEntry> {
    let parsed: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                event_id = %event_id,
                day_key = %day_key,
                error = %e,
                "Unreadable version list in day header, treating as empty"
            );
            return Vec::new();
        }
    };
    let Some(items) = parsed.as_array() else {
        warn!(
            event_id = %event_id,
            day_key = %day_key,
            "Day header version list is not an array, treating as empty"
        );
        return Vec::new();
    };

    let mut entries: Vec<VersionEntry> = Vec::with_capacity(items.len());
    for item in items {
        let Some(v) = item.get("v").and_then(|v| v.as_u64()) else {
            continue;
        };
        entries.push(VersionEntry {
            v: v as u32,
            ts: item.get("ts").and_then(|t| t.as_i64()).unwrap_or(0),
            source: item
                .get("source")
                .and_then(|s| s.as_str())
                .unwrap_or("CLOSE")
                .to_string(),
        });
    }
    entries.sort_by_key(|e| e.v);
    entries.dedup_by_key(|e| e.v);
    entries
}

/// Load one day header, or None if the day has never been written.
pub fn get_day_header(
    db: &DbState,
    event_id: &str,
    day_key: &str,
) -> CashResult<Option<DayHeader>> {
    let conn = db.lock_conn()?;
    let row = conn
        .query_row(
            "SELECT status, open_ts, close_ts, versions, updated_at
             FROM cash_day_history
             WHERE event_id = ?1 AND day_key = ?2",
            params![event_id, day_key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(status, open_ts, close_ts, versions, updated_at)| DayHeader {
        key: header_key(event_id, day_key),
        event_id: event_id.to_string(),
        day_key: day_key.to_string(),
        status: DayStatus::from_legacy(&status),
        open_ts,
        close_ts,
        versions: parse_version_entries(&versions, event_id, day_key),
        updated_at,
    }))
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Insert a snapshot row. Plain INSERT: a version collision violates the
/// primary key and surfaces as a storage error instead of replacing the
/// stored copy.
pub(crate) fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> CashResult<()> {
    let data = serde_json::to_string(snapshot)
        .map_err(|e| CashError::storage(format!("serialize snapshot: {e}")))?;
    conn.execute(
        "INSERT INTO cash_day_snapshots (event_id, day_key, version, created_ts, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.event_id,
            snapshot.day_key,
            snapshot.version,
            snapshot.ts,
            data
        ],
    )?;
    Ok(())
}

/// (version, created_ts) for every stored snapshot row, ascending.
fn stored_snapshot_rows_conn(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
) -> CashResult<Vec<(u32, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT version, created_ts FROM cash_day_snapshots
         WHERE event_id = ?1 AND day_key = ?2
         ORDER BY version",
    )?;
    let rows = stmt
        .query_map(params![event_id, day_key], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Next version for (event, day): 1 + the max the header list and the stored
/// rows know between them, so drift in either direction can never reuse a
/// version number.
pub(crate) fn next_snapshot_version(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
) -> CashResult<u32> {
    let header_max = header_versions_conn(conn, event_id, day_key)?
        .iter()
        .map(|e| e.v)
        .max()
        .unwrap_or(0);
    let stored_max = stored_snapshot_rows_conn(conn, event_id, day_key)?
        .iter()
        .map(|(v, _)| *v)
        .max()
        .unwrap_or(0);
    Ok(header_max.max(stored_max) + 1)
}

/// All known versions for (event, day), ascending and unique: the union of
/// the header's list and the stored rows. When the rows hold versions the
/// header has not recorded, the header is healed in place (best-effort; a
/// heal failure is logged, never surfaced).
pub fn list_snapshot_versions(
    db: &DbState,
    event_id: &str,
    day_key: &str,
) -> CashResult<Vec<u32>> {
    let conn = db.lock_conn()?;
    let header = header_versions_conn(&conn, event_id, day_key)?;
    let stored = stored_snapshot_rows_conn(&conn, event_id, day_key)?;

    let mut all: BTreeSet<u32> = header.iter().map(|e| e.v).collect();
    all.extend(stored.iter().map(|(v, _)| *v));

    let missing: Vec<&(u32, i64)> = stored
        .iter()
        .filter(|(v, _)| !header.iter().any(|e| e.v == *v))
        .collect();
    if !missing.is_empty() {
        let mut healed = header;
        for (v, ts) in missing.iter().copied() {
            healed.push(VersionEntry {
                v: *v,
                ts: *ts,
                source: "CLOSE".to_string(),
            });
        }
        healed.sort_by_key(|e| e.v);
        match write_header_versions(&conn, event_id, day_key, &healed) {
            Ok(()) => info!(
                event_id = %event_id,
                day_key = %day_key,
                added = missing.len(),
                "Healed day header version list from stored snapshots"
            ),
            Err(e) => warn!(
                event_id = %event_id,
                day_key = %day_key,
                error = %e,
                "Could not heal day header version list"
            ),
        }
    }

    Ok(all.into_iter().collect())
}

/// Load one stored snapshot, or None if that version was never written.
pub fn load_snapshot(
    db: &DbState,
    event_id: &str,
    day_key: &str,
    version: u32,
) -> CashResult<Option<Snapshot>> {
    let conn = db.lock_conn()?;
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM cash_day_snapshots
             WHERE event_id = ?1 AND day_key = ?2 AND version = ?3",
            params![event_id, day_key, version],
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
        CashError::storage(format!(
            "corrupt snapshot {event_id}/{day_key} v{version}: {e}"
        ))
    })?;
    Ok(Some(snapshot))
}

// ---------------------------------------------------------------------------
// History listing
// ---------------------------------------------------------------------------

/// One day line in the history screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDay {
    pub day_key: String,
    pub status: DayStatus,
    pub open_ts: Option<i64>,
    pub close_ts: Option<i64>,
    pub version_count: usize,
    pub updated_at: String,
}

/// All of one event's days, most recent day first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHistory {
    pub event_id: String,
    pub days: Vec<HistoryDay>,
}

/// History listing, grouped by event. Events are ordered by their most
/// recent header update (newest activity first); within an event, days run
/// newest first. Pass an event id to list just that event.
pub fn list_history(db: &DbState, event_id: Option<&str>) -> CashResult<Vec<EventHistory>> {
    let conn = db.lock_conn()?;
    let sql = "SELECT h.event_id, h.day_key, h.status, h.open_ts, h.close_ts, h.versions, h.updated_at
         FROM cash_day_history h
         WHERE (?1 IS NULL OR h.event_id = ?1)
         ORDER BY (SELECT MAX(x.updated_at) FROM cash_day_history x
                   WHERE x.event_id = h.event_id) DESC,
                  h.event_id ASC,
                  h.day_key DESC";
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![event_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: Vec<EventHistory> = Vec::new();
    for (event, day, status, open_ts, close_ts, versions, updated_at) in rows {
        let day_line = HistoryDay {
            day_key: day.clone(),
            status: DayStatus::from_legacy(&status),
            open_ts,
            close_ts,
            version_count: parse_version_entries(&versions, &event, &day).len(),
            updated_at,
        };
        match groups.last_mut() {
            Some(group) if group.event_id == event => group.days.push(day_line),
            _ => groups.push(EventHistory {
                event_id: event,
                days: vec![day_line],
            }),
        }
    }
    Ok(groups)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cashday::{self, DrawerCount};
    use crate::db;
    use crate::recon;
    use rusqlite::Connection;
    use serde_json::json;

    fn test_state() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        db::state_for_test(conn)
    }

    fn seed_header(db: &DbState, event_id: &str, day_key: &str, versions: &str) {
        let conn = db.lock_conn().unwrap();
        conn.execute(
            "INSERT INTO cash_day_history (event_id, day_key, status, versions)
             VALUES (?1, ?2, 'CLOSED', ?3)",
            params![event_id, day_key, versions],
        )
        .expect("seed header");
    }

    fn seed_snapshot_row(db: &DbState, event_id: &str, day_key: &str, version: u32, ts: i64) {
        let conn = db.lock_conn().unwrap();
        conn.execute(
            "INSERT INTO cash_day_snapshots (event_id, day_key, version, created_ts, data)
             VALUES (?1, ?2, ?3, ?4, '{}')",
            params![event_id, day_key, version, ts],
        )
        .expect("seed snapshot row");
    }

    fn built_snapshot(event_id: &str, day_key: &str, version: u32) -> Snapshot {
        let mut record = cashday::CashDayRecord::new_open(event_id, day_key);
        record.initial = Some(DrawerCount::from_raw(
            &json!({"NIO": {"denomCounts": {"500": 1}}, "USD": {"denomCounts": {"20": 2}}}),
        ));
        record.final_count = Some(DrawerCount::from_raw(
            &json!({"NIO": {"denomCounts": {"500": 1}}, "USD": {"denomCounts": {"20": 2}}}),
        ));
        let summary = recon::reconcile_record(&record, 0.0);
        Snapshot::from_record(&record, &summary, version, 1_700_000_000_000)
    }

    #[test]
    fn test_header_upsert_leaves_versions_alone() {
        let db = test_state();
        seed_header(&db, "ev1", "2024-06-01", r#"[{"v":1,"ts":5,"source":"CLOSE"}]"#);

        let mut record = cashday::CashDayRecord::new_open("ev1", "2024-06-01");
        record.open_ts = 42;
        {
            let conn = db.lock_conn().unwrap();
            upsert_day_header(&conn, &record).expect("upsert");
        }

        let header = get_day_header(&db, "ev1", "2024-06-01")
            .expect("get")
            .expect("exists");
        assert_eq!(header.status, DayStatus::Open, "status follows the record");
        assert_eq!(header.open_ts, Some(42));
        assert_eq!(header.versions.len(), 1, "version list untouched by upsert");
        assert_eq!(header.versions[0].v, 1);
        assert_eq!(header.key, "cashv2hist:ev1:2024-06-01");
    }

    #[test]
    fn test_append_header_version_is_idempotent_per_version() {
        let db = test_state();
        seed_header(&db, "ev1", "2024-06-01", "[]");

        let conn = db.lock_conn().unwrap();
        let entry = VersionEntry {
            v: 1,
            ts: 100,
            source: "CLOSE".to_string(),
        };
        append_header_version(&conn, "ev1", "2024-06-01", &entry).expect("append");
        append_header_version(&conn, "ev1", "2024-06-01", &entry).expect("append again");
        let versions = header_versions_conn(&conn, "ev1", "2024-06-01").expect("read");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].ts, 100, "first entry wins");
    }

    #[test]
    fn test_snapshot_insert_never_overwrites() {
        let db = test_state();
        let snap = built_snapshot("ev1", "2024-06-01", 1);
        {
            let conn = db.lock_conn().unwrap();
            insert_snapshot(&conn, &snap).expect("first insert");
            let err = insert_snapshot(&conn, &snap).expect_err("collision must fail");
            assert!(!err.is_validation(), "collision is a storage failure");
        }

        let stored = load_snapshot(&db, "ev1", "2024-06-01", 1)
            .expect("load")
            .expect("exists");
        assert_eq!(stored.key, "cashv2snap:ev1:2024-06-01:v1");
        assert_eq!(stored.version, 1);
        assert_eq!(stored.currencies.nio.initial.total, 500.0);
        assert_eq!(stored.currencies.usd.final_count.total, 40.0);
    }

    #[test]
    fn test_load_snapshot_missing_is_none() {
        let db = test_state();
        assert!(load_snapshot(&db, "ev1", "2024-06-01", 1)
            .expect("load")
            .is_none());
    }

    #[test]
    fn test_version_listing_unions_and_heals_header() {
        let db = test_state();
        // Header only knows v1; rows hold v1 and v2 (interrupted header write)
        seed_header(&db, "ev1", "2024-06-01", r#"[{"v":1,"ts":10,"source":"CLOSE"}]"#);
        seed_snapshot_row(&db, "ev1", "2024-06-01", 1, 10);
        seed_snapshot_row(&db, "ev1", "2024-06-01", 2, 20);

        let versions = list_snapshot_versions(&db, "ev1", "2024-06-01").expect("list");
        assert_eq!(versions, vec![1, 2]);

        // Header was healed: v2 recorded with the row's timestamp
        let header = get_day_header(&db, "ev1", "2024-06-01")
            .expect("get")
            .expect("exists");
        assert_eq!(header.versions.len(), 2);
        assert_eq!(header.versions[1].v, 2);
        assert_eq!(header.versions[1].ts, 20);
    }

    #[test]
    fn test_heal_creates_header_for_orphaned_rows() {
        let db = test_state();
        // Snapshot rows with no header at all (partial import)
        seed_snapshot_row(&db, "ev1", "2024-06-01", 1, 10);

        let versions = list_snapshot_versions(&db, "ev1", "2024-06-01").expect("list");
        assert_eq!(versions, vec![1]);

        let header = get_day_header(&db, "ev1", "2024-06-01")
            .expect("get")
            .expect("header created by the heal");
        assert_eq!(header.status, DayStatus::Closed);
        assert_eq!(header.versions.len(), 1);
        assert_eq!(header.versions[0].ts, 10);
    }

    #[test]
    fn test_version_listing_keeps_header_claims() {
        let db = test_state();
        // Header claims v1 and v2 but only v1 is stored; the claim survives
        seed_header(
            &db,
            "ev1",
            "2024-06-01",
            r#"[{"v":1,"ts":10,"source":"CLOSE"},{"v":2,"ts":20,"source":"CLOSE"}]"#,
        );
        seed_snapshot_row(&db, "ev1", "2024-06-01", 1, 10);

        let versions = list_snapshot_versions(&db, "ev1", "2024-06-01").expect("list");
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_corrupt_version_list_degrades_to_rows() {
        let db = test_state();
        seed_header(&db, "ev1", "2024-06-01", "not json at all");
        seed_snapshot_row(&db, "ev1", "2024-06-01", 3, 30);

        let versions = list_snapshot_versions(&db, "ev1", "2024-06-01").expect("list");
        assert_eq!(versions, vec![3], "rows are the fallback truth");

        let conn = db.lock_conn().unwrap();
        assert_eq!(
            next_snapshot_version(&conn, "ev1", "2024-06-01").expect("next"),
            4
        );
    }

    #[test]
    fn test_next_version_takes_max_of_both_sources() {
        let db = test_state();
        seed_header(&db, "ev1", "2024-06-01", r#"[{"v":3,"ts":1,"source":"CLOSE"}]"#);
        seed_snapshot_row(&db, "ev1", "2024-06-01", 1, 1);

        let conn = db.lock_conn().unwrap();
        assert_eq!(
            next_snapshot_version(&conn, "ev1", "2024-06-01").expect("next"),
            4,
            "header's higher claim wins so no version is ever reused"
        );
        assert_eq!(
            next_snapshot_version(&conn, "ev1", "2024-06-02").expect("next"),
            1,
            "fresh day starts at v1"
        );
    }

    #[test]
    fn test_snapshot_partitions_movements_by_currency() {
        use crate::movements::{Movement, MovementKind};

        let mut record = cashday::CashDayRecord::new_open("ev1", "2024-06-01");
        record.movements = vec![
            Movement {
                id: "a".into(),
                ts: 1,
                kind: MovementKind::In,
                currency: Currency::Nio,
                amount: 200.0,
                note: None,
            },
            Movement {
                id: "b".into(),
                ts: 2,
                kind: MovementKind::Out,
                currency: Currency::Usd,
                amount: 10.0,
                note: None,
            },
        ];
        let summary = recon::reconcile_record(&record, 0.0);
        let snap = Snapshot::from_record(&record, &summary, 1, 99);

        assert_eq!(snap.currencies.nio.movements.len(), 1);
        assert_eq!(snap.currencies.nio.movements[0].id, "a");
        assert_eq!(snap.currencies.nio.sums.inflow, 200.0);
        assert_eq!(snap.currencies.usd.movements.len(), 1);
        assert_eq!(snap.currencies.usd.sums.outflow, 10.0);
    }

    #[test]
    fn test_history_listing_orders_events_and_days() {
        let db = test_state();
        {
            let conn = db.lock_conn().unwrap();
            for (event, day, updated) in [
                ("ev-old", "2024-05-01", "2024-05-01 10:00:00"),
                ("ev-new", "2024-06-01", "2024-06-01 10:00:00"),
                ("ev-new", "2024-06-02", "2024-06-02 10:00:00"),
            ] {
                conn.execute(
                    "INSERT INTO cash_day_history (event_id, day_key, status, updated_at)
                     VALUES (?1, ?2, 'OPEN', ?3)",
                    params![event, day, updated],
                )
                .expect("seed");
            }
        }

        let groups = list_history(&db, None).expect("list");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].event_id, "ev-new", "freshest event first");
        assert_eq!(groups[0].days[0].day_key, "2024-06-02", "newest day first");
        assert_eq!(groups[0].days[1].day_key, "2024-06-01");
        assert_eq!(groups[1].event_id, "ev-old");

        let only_old = list_history(&db, Some("ev-old")).expect("list one");
        assert_eq!(only_old.len(), 1);
        assert_eq!(only_old[0].days.len(), 1);
    }

    #[test]
    fn test_open_day_is_listable_before_any_close() {
        let db = test_state();
        cashday::ensure(&db, "ev1", "2024-06-01").expect("ensure");

        let groups = list_history(&db, Some("ev1")).expect("list");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].days[0].status, DayStatus::Open);
        assert_eq!(groups[0].days[0].version_count, 0);
    }
}
