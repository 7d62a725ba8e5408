//! Cash day records: the per-(event, day) drawer ledger.
//!
//! A record is created lazily on first writable access, mutated in place
//! through explicit saves, and never deleted. Older databases contain
//! records written by earlier versions of the app with missing or malformed
//! fields; `ensure` repairs those in a single pass and persists the fixed
//! shape, while `load` stays a pure read.
//!
//! Stored JSON keeps the shapes and key strings the browser version wrote
//! (`cash:v2:{eventId}:{dayKey}`, camelCase fields) so an imported database
//! remains readable by both sides.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{CashError, CashResult};
use crate::history;
use crate::money::{round_money, Currency, CurrencyCount};
use crate::movements::{Movement, MovementKind};

/// Record format marker. Version 1 was the flat drawer count of the old
/// app; everything here reads and writes version 2.
pub const RECORD_VERSION: u32 = 2;

/// Day lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl DayStatus {
    pub fn code(&self) -> &'static str {
        match self {
            DayStatus::Open => "OPEN",
            DayStatus::Closed => "CLOSED",
        }
    }

    /// Normalize a stored status string. Older records used Spanish labels
    /// and mixed case; anything unrecognized counts as open.
    pub fn from_legacy(s: &str) -> DayStatus {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLOSED" | "CERRADO" => DayStatus::Closed,
            _ => DayStatus::Open,
        }
    }
}

impl std::fmt::Display for DayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Both currencies' drawer counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawerCount {
    #[serde(rename = "NIO")]
    pub nio: CurrencyCount,
    #[serde(rename = "USD")]
    pub usd: CurrencyCount,
}

impl DrawerCount {
    pub fn get(&self, currency: Currency) -> &CurrencyCount {
        match currency {
            Currency::Nio => &self.nio,
            Currency::Usd => &self.usd,
        }
    }

    /// Build from raw JSON of shape `{NIO: {...}, USD: {...}}`, recomputing
    /// both totals from the counts.
    pub fn from_raw(raw: &Value) -> DrawerCount {
        DrawerCount {
            nio: CurrencyCount::from_raw(
                Currency::Nio,
                raw.get("NIO").unwrap_or(&Value::Null),
            ),
            usd: CurrencyCount::from_raw(
                Currency::Usd,
                raw.get("USD").unwrap_or(&Value::Null),
            ),
        }
    }

    /// Re-canonicalize counts and recompute totals.
    pub fn sanitized(&self) -> DrawerCount {
        DrawerCount {
            nio: CurrencyCount::from_counts(Currency::Nio, &self.nio.denom_counts),
            usd: CurrencyCount::from_counts(Currency::Usd, &self.usd.denom_counts),
        }
    }
}

/// Bookkeeping timestamps, stored as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub created_at: String,
    pub updated_at: String,
    pub closed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_from_day_key: Option<String>,
}

/// One audit trail entry. Append-only, never truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub ts: i64,
    pub action: String,
    pub reason: String,
    pub day_key: String,
    pub event_id: String,
}

/// The full cash day record, serialized as the `data` JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashDayRecord {
    pub version: u32,
    pub key: String,
    pub event_id: String,
    pub day_key: String,
    pub status: DayStatus,
    /// Epoch milliseconds. Its local calendar date always equals `day_key`.
    pub open_ts: i64,
    /// Epoch milliseconds; null while the day is open.
    pub close_ts: Option<i64>,
    /// Exchange rate (NIO per USD), positive or null.
    pub fx: Option<f64>,
    pub initial: Option<DrawerCount>,
    pub movements: Vec<Movement>,
    #[serde(rename = "final")]
    pub final_count: Option<DrawerCount>,
    /// Informational cache of the day's local cash sales; reconciliation
    /// recomputes this fresh, never trusts it.
    pub cash_sales_c: f64,
    pub meta: RecordMeta,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl CashDayRecord {
    /// Fresh open record for (event, day). The open timestamp is "now" when
    /// the day is today, otherwise midnight of the day, so the operational
    /// date invariant holds from the start.
    pub(crate) fn new_open(event_id: &str, day_key: &str) -> CashDayRecord {
        let open_ts = if day_key == today_key() {
            now_ms()
        } else {
            day_key_midnight_ms(day_key).unwrap_or_else(now_ms)
        };
        let now = now_iso();
        CashDayRecord {
            version: RECORD_VERSION,
            key: record_key(event_id, day_key),
            event_id: event_id.to_string(),
            day_key: day_key.to_string(),
            status: DayStatus::Open,
            open_ts,
            close_ts: None,
            fx: None,
            initial: None,
            movements: Vec::new(),
            final_count: None,
            cash_sales_c: 0.0,
            meta: RecordMeta {
                created_at: now.clone(),
                updated_at: now,
                closed_at: None,
                opened_from_day_key: None,
            },
            audit: Vec::new(),
        }
    }
}

/// Canonical storage key for a record.
pub fn record_key(event_id: &str, day_key: &str) -> String {
    format!("cash:v2:{event_id}:{day_key}")
}

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Today's operational day key in local time.
pub fn today_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Local calendar date of an epoch-ms timestamp.
pub(crate) fn day_key_of_ms(ts: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(ts)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Local midnight of a day key, as epoch ms. Falls back to UTC midnight for
/// the rare local times that do not exist (DST gap).
pub(crate) fn day_key_midnight_ms(day_key: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(day_key, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    match Local.from_local_datetime(&naive).earliest() {
        Some(dt) => Some(dt.timestamp_millis()),
        None => Some(Utc.from_utc_datetime(&naive).timestamp_millis()),
    }
}

/// Parse a stored timestamp string (RFC 3339, or the older space-separated
/// UTC format) to epoch ms.
pub(crate) fn parse_ts_ms(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    None
}

/// First candidate that is a plausible timestamp (present and positive).
pub(crate) fn first_valid_ts(candidates: &[Option<i64>]) -> Option<i64> {
    candidates.iter().flatten().copied().find(|v| *v > 0)
}

fn ms_to_iso(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(now_iso)
}

/// Epoch-ms value out of a JSON field that may be a number, a numeric
/// string, or a timestamp string.
fn json_ms(v: Option<&Value>) -> Option<i64> {
    match v {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok().or_else(|| parse_ts_ms(s)),
        _ => None,
    }
}

/// Validate identity arguments shared by every operation.
pub(crate) fn require_ids(event_id: &str, day_key: &str) -> CashResult<()> {
    if event_id.trim().is_empty() {
        return Err(CashError::validation("event id is required"));
    }
    // Byte order on day keys must equal date order (continuation and the
    // listings sort on them), so only the zero-padded form is accepted;
    // chrono's parser alone also takes unpadded months and days.
    match NaiveDate::parse_from_str(day_key, "%Y-%m-%d") {
        Ok(d) if d.format("%Y-%m-%d").to_string() == day_key => Ok(()),
        _ => Err(CashError::validation(format!("invalid day key: {day_key}"))),
    }
}

// ---------------------------------------------------------------------------
// Normalization / legacy repair
// ---------------------------------------------------------------------------

/// Build a canonical record from stored JSON, repairing legacy
/// inconsistencies. Returns the record plus whether anything structural was
/// repaired (which callers use to decide on a write-back).
///
/// Recomputing drawer totals from counts is not a "repair": totals are
/// derived values and stored ones are never trusted in the first place.
pub(crate) fn normalize_record(
    event_id: &str,
    day_key: &str,
    raw: &Value,
) -> (CashDayRecord, bool) {
    let mut repaired = false;

    if raw.get("version").and_then(|v| v.as_u64()) != Some(RECORD_VERSION as u64) {
        repaired = true;
    }

    let canonical_key = record_key(event_id, day_key);
    if raw.get("key").and_then(|k| k.as_str()) != Some(canonical_key.as_str()) {
        repaired = true;
    }

    let raw_status = raw.get("status").and_then(|s| s.as_str());
    let status = DayStatus::from_legacy(raw_status.unwrap_or(""));
    if raw_status != Some(status.code()) {
        repaired = true;
    }

    let meta_raw = raw.get("meta");
    let created_at_raw = meta_raw
        .and_then(|m| m.get("createdAt"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let updated_at_raw = meta_raw
        .and_then(|m| m.get("updatedAt"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let closed_at_raw = meta_raw
        .and_then(|m| m.get("closedAt"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let opened_from_day_key = meta_raw
        .and_then(|m| m.get("openedFromDayKey"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    // openTs: stored value if plausible, else midnight of the day, else
    // createdAt, else now.
    let stored_open = json_ms(raw.get("openTs")).filter(|v| *v > 0);
    let open_ts = match stored_open {
        Some(ts) => ts,
        None => {
            repaired = true;
            first_valid_ts(&[
                day_key_midnight_ms(day_key),
                created_at_raw.as_deref().and_then(parse_ts_ms),
            ])
            .unwrap_or_else(now_ms)
        }
    };

    // closeTs: backfilled while closed, forced null while open.
    let stored_close = json_ms(raw.get("closeTs")).filter(|v| *v > 0);
    let (close_ts, closed_at) = match status {
        DayStatus::Closed => {
            let ts = match stored_close {
                Some(ts) => ts,
                None => {
                    repaired = true;
                    first_valid_ts(&[
                        closed_at_raw.as_deref().and_then(parse_ts_ms),
                        updated_at_raw.as_deref().and_then(parse_ts_ms),
                    ])
                    .unwrap_or_else(now_ms)
                }
            };
            let iso = closed_at_raw.unwrap_or_else(|| {
                repaired = true;
                ms_to_iso(ts)
            });
            (Some(ts), Some(iso))
        }
        DayStatus::Open => {
            if stored_close.is_some() || closed_at_raw.is_some() {
                repaired = true;
            }
            (None, None)
        }
    };

    // fx: positive number (or numeric string) rounded to 2 decimals, else null.
    let fx = match raw.get("fx") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let parsed = v
                .as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                .filter(|f| f.is_finite() && *f > 0.0);
            match parsed {
                Some(f) => {
                    if !v.is_f64() && !v.is_i64() && !v.is_u64() {
                        repaired = true;
                    }
                    Some(round_money(f))
                }
                None => {
                    repaired = true;
                    None
                }
            }
        }
    };

    let initial = drawer_or_null(raw.get("initial"), &mut repaired);
    let final_count = drawer_or_null(raw.get("final"), &mut repaired);

    // movements: best effort. Entries whose kind or currency cannot be
    // recognized are dropped with a warning; ids and timestamps are
    // backfilled.
    let mut movements = Vec::new();
    match raw.get("movements") {
        Some(Value::Array(items)) => {
            for item in items {
                if !item.is_object() {
                    repaired = true;
                    continue;
                }
                let kind = item
                    .get("kind")
                    .and_then(|k| k.as_str())
                    .and_then(MovementKind::parse);
                let currency = item
                    .get("currency")
                    .and_then(|c| c.as_str())
                    .and_then(Currency::parse);
                let (Some(kind), Some(currency)) = (kind, currency) else {
                    warn!(
                        event_id = %event_id,
                        day_key = %day_key,
                        "Dropping movement with unrecognized kind or currency"
                    );
                    repaired = true;
                    continue;
                };
                let amount = item
                    .get("amount")
                    .and_then(|a| {
                        a.as_f64()
                            .or_else(|| a.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                    })
                    .filter(|a| a.is_finite());
                let Some(amount) = amount else {
                    warn!(
                        event_id = %event_id,
                        day_key = %day_key,
                        "Dropping movement without a usable amount"
                    );
                    repaired = true;
                    continue;
                };
                let id = match item
                    .get("id")
                    .and_then(|i| i.as_str())
                    .filter(|s| !s.is_empty())
                {
                    Some(id) => id.to_string(),
                    None => {
                        repaired = true;
                        Uuid::new_v4().to_string()
                    }
                };
                let ts = match json_ms(item.get("ts")).filter(|v| *v > 0) {
                    Some(ts) => ts,
                    None => {
                        repaired = true;
                        open_ts
                    }
                };
                let note = item
                    .get("note")
                    .and_then(|n| n.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                movements.push(Movement {
                    id,
                    ts,
                    kind,
                    currency,
                    amount,
                    note,
                });
            }
        }
        None | Some(Value::Null) => repaired = true,
        Some(_) => repaired = true,
    }

    // audit: lenient parse, entries are never dropped for odd field values.
    let mut audit = Vec::new();
    if let Some(Value::Array(items)) = raw.get("audit") {
        for item in items {
            if !item.is_object() {
                repaired = true;
                continue;
            }
            audit.push(AuditEntry {
                ts: json_ms(item.get("ts")).unwrap_or(0),
                action: item
                    .get("action")
                    .and_then(|a| a.as_str())
                    .unwrap_or("")
                    .to_string(),
                reason: item
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("")
                    .to_string(),
                day_key: item
                    .get("dayKey")
                    .and_then(|d| d.as_str())
                    .unwrap_or(day_key)
                    .to_string(),
                event_id: item
                    .get("eventId")
                    .and_then(|e| e.as_str())
                    .unwrap_or(event_id)
                    .to_string(),
            });
        }
    }

    let cash_sales_c = raw
        .get("cashSalesC")
        .and_then(|v| v.as_f64())
        .map(round_money)
        .unwrap_or(0.0);

    let created_at = match created_at_raw {
        Some(s) => s,
        None => {
            repaired = true;
            ms_to_iso(open_ts)
        }
    };
    let updated_at = match updated_at_raw {
        Some(s) => s,
        None => {
            repaired = true;
            now_iso()
        }
    };

    let record = CashDayRecord {
        version: RECORD_VERSION,
        key: canonical_key,
        event_id: event_id.to_string(),
        day_key: day_key.to_string(),
        status,
        open_ts,
        close_ts,
        fx,
        initial,
        movements,
        final_count,
        cash_sales_c,
        meta: RecordMeta {
            created_at,
            updated_at,
            closed_at,
            opened_from_day_key,
        },
        audit,
    };
    (record, repaired)
}

fn drawer_or_null(v: Option<&Value>, repaired: &mut bool) -> Option<DrawerCount> {
    match v {
        None | Some(Value::Null) => None,
        Some(val) if val.is_object() => Some(DrawerCount::from_raw(val)),
        Some(_) => {
            *repaired = true;
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Load / ensure / save
// ---------------------------------------------------------------------------

pub(crate) fn read_raw_conn(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
) -> CashResult<Option<String>> {
    conn.query_row(
        "SELECT data FROM cash_days WHERE event_id = ?1 AND day_key = ?2",
        params![event_id, day_key],
        |row| row.get(0),
    )
    .optional()
    .map_err(CashError::from)
}

/// Read and normalize a record on an already-held connection. Pure read.
pub(crate) fn load_normalized_conn(
    conn: &Connection,
    event_id: &str,
    day_key: &str,
) -> CashResult<Option<CashDayRecord>> {
    match read_raw_conn(conn, event_id, day_key)? {
        None => Ok(None),
        Some(json) => {
            let raw: Value = serde_json::from_str(&json).map_err(|e| {
                CashError::storage(format!("corrupt cash day record {event_id}/{day_key}: {e}"))
            })?;
            let (record, _) = normalize_record(event_id, day_key, &raw);
            Ok(Some(record))
        }
    }
}

/// Pure read: returns the normalized record, or None. Never creates and
/// never writes, so read-only viewers cannot leave records behind.
pub fn load(db: &DbState, event_id: &str, day_key: &str) -> CashResult<Option<CashDayRecord>> {
    require_ids(event_id, day_key)?;
    let conn = db.lock_conn()?;
    load_normalized_conn(&conn, event_id, day_key)
}

/// Read-or-create. On existing records any legacy repair is persisted
/// immediately (including the history header); new records start OPEN and
/// empty.
pub fn ensure(db: &DbState, event_id: &str, day_key: &str) -> CashResult<CashDayRecord> {
    require_ids(event_id, day_key)?;

    let existing = {
        let conn = db.lock_conn()?;
        read_raw_conn(&conn, event_id, day_key)?
    };

    match existing {
        None => {
            let record = CashDayRecord::new_open(event_id, day_key);
            persist_record(db, &record)?;
            info!(event_id = %event_id, day_key = %day_key, "Cash day record created");
            Ok(record)
        }
        Some(json) => {
            let raw: Value = serde_json::from_str(&json).map_err(|e| {
                CashError::storage(format!("corrupt cash day record {event_id}/{day_key}: {e}"))
            })?;
            let (mut record, repaired) = normalize_record(event_id, day_key, &raw);
            if repaired {
                record.meta.updated_at = now_iso();
                persist_record(db, &record)?;
                info!(event_id = %event_id, day_key = %day_key, "Repaired legacy cash day record");
            }
            Ok(record)
        }
    }
}

/// Validate and persist caller-side edits (counts, fx, movements, notes).
///
/// Status transitions are not accepted here: closing goes through the close
/// operation and reopening through the reopen operation, which carry the
/// reconciliation checks and audit writes a bare save would skip.
pub fn save(db: &DbState, mut record: CashDayRecord) -> CashResult<CashDayRecord> {
    require_ids(&record.event_id, &record.day_key)?;

    if record.version != RECORD_VERSION {
        return Err(CashError::validation("unsupported cash record version"));
    }

    let canonical = record_key(&record.event_id, &record.day_key);
    if !record.key.is_empty() && record.key != canonical {
        return Err(CashError::validation(format!(
            "record key {} does not match its event and day",
            record.key
        )));
    }
    record.key = canonical;

    // openTs must stay on the operational day
    if day_key_of_ms(record.open_ts).as_deref() != Some(record.day_key.as_str()) {
        record.open_ts = day_key_midnight_ms(&record.day_key).unwrap_or_else(now_ms);
    }

    match record.status {
        DayStatus::Closed => {
            let ts = first_valid_ts(&[
                record.close_ts,
                record.meta.closed_at.as_deref().and_then(parse_ts_ms),
            ])
            .unwrap_or_else(now_ms);
            record.close_ts = Some(ts);
            record.meta.closed_at = Some(ms_to_iso(ts));
        }
        DayStatus::Open => {
            record.close_ts = None;
            record.meta.closed_at = None;
        }
    }

    if record.meta.created_at.trim().is_empty() {
        record.meta.created_at = ms_to_iso(record.open_ts);
    }
    record.meta.updated_at = now_iso();

    record.fx = record
        .fx
        .filter(|f| f.is_finite() && *f > 0.0)
        .map(round_money);
    record.initial = record.initial.as_ref().map(DrawerCount::sanitized);
    record.final_count = record.final_count.as_ref().map(DrawerCount::sanitized);
    record.cash_sales_c = round_money(record.cash_sales_c);

    let conn = db.lock_conn()?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(CashError::from)?;
    let result = (|| -> CashResult<()> {
        // The prior status comes from the canonical record, never from the
        // mirror column; imported rows can carry a stale mirror.
        let stored = load_normalized_conn(&conn, &record.event_id, &record.day_key)?
            .map(|prior| prior.status);

        match (stored, record.status) {
            (Some(DayStatus::Closed), DayStatus::Open) => {
                return Err(CashError::validation(
                    "a closed day can only be reopened through the reopen operation",
                ));
            }
            (Some(DayStatus::Closed), DayStatus::Closed) => {
                return Err(CashError::validation(
                    "day is closed; reopen it to make changes",
                ));
            }
            (_, DayStatus::Closed) => {
                return Err(CashError::validation(
                    "a day can only be closed through the close operation",
                ));
            }
            _ => {}
        }

        persist_record_conn(&conn, &record)?;
        history::upsert_day_header(&conn, &record)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT").map_err(CashError::from)?;
            Ok(record)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Write a record row without the transition guard. Used by the lifecycle
/// operations (create, repair, close, reopen) that legitimately change
/// status; always paired with the history header upsert.
pub(crate) fn persist_record(db: &DbState, record: &CashDayRecord) -> CashResult<()> {
    let conn = db.lock_conn()?;
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(CashError::from)?;
    let result = (|| -> CashResult<()> {
        persist_record_conn(&conn, record)?;
        history::upsert_day_header(&conn, record)?;
        Ok(())
    })();
    match result {
        Ok(()) => conn.execute_batch("COMMIT").map_err(CashError::from),
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Single-row write on an already-held connection; the caller owns the
/// transaction.
pub(crate) fn persist_record_conn(conn: &Connection, record: &CashDayRecord) -> CashResult<()> {
    let data = serde_json::to_string(record)
        .map_err(|e| CashError::storage(format!("serialize cash day record: {e}")))?;
    conn.execute(
        "INSERT INTO cash_days (event_id, day_key, status, open_ts, close_ts, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(event_id, day_key) DO UPDATE SET
            status = excluded.status,
            open_ts = excluded.open_ts,
            close_ts = excluded.close_ts,
            data = excluded.data,
            updated_at = excluded.updated_at",
        params![
            record.event_id,
            record.day_key,
            record.status.code(),
            record.open_ts,
            record.close_ts,
            data
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Multi-day continuation
// ---------------------------------------------------------------------------

/// Open today's drawer from the most recent closed day.
///
/// Idempotent: if today's record already exists it is returned unchanged.
/// Otherwise the previous day must be CLOSED with a saved final count; its
/// final denomination counts become today's initial counts, with totals
/// recomputed from the counts so a corrupt stored total cannot propagate.
pub fn open_today_from_prev_closed(
    db: &DbState,
    event_id: &str,
    today: &str,
) -> CashResult<CashDayRecord> {
    require_ids(event_id, today)?;

    if let Some(record) = load(db, event_id, today)? {
        return Ok(record);
    }

    let prior = {
        let conn = db.lock_conn()?;
        conn.query_row(
            "SELECT day_key, data FROM cash_days
             WHERE event_id = ?1 AND day_key < ?2
             ORDER BY day_key DESC, open_ts DESC
             LIMIT 1",
            params![event_id, today],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(CashError::from)?
    };

    let (prior_day, prior_json) =
        prior.ok_or_else(|| CashError::validation("no prior day to copy from"))?;
    let raw: Value = serde_json::from_str(&prior_json).map_err(|e| {
        CashError::storage(format!("corrupt cash day record {event_id}/{prior_day}: {e}"))
    })?;
    let (prior_record, _) = normalize_record(event_id, &prior_day, &raw);

    if prior_record.status != DayStatus::Closed {
        return Err(CashError::validation(format!(
            "close the previous day ({prior_day}) first"
        )));
    }
    let prior_final = prior_record
        .final_count
        .as_ref()
        .ok_or_else(|| CashError::validation("previous day has no final count to copy"))?;

    let mut record = CashDayRecord::new_open(event_id, today);
    record.initial = Some(DrawerCount {
        nio: CurrencyCount::from_counts(Currency::Nio, &prior_final.nio.denom_counts),
        usd: CurrencyCount::from_counts(Currency::Usd, &prior_final.usd.denom_counts),
    });
    record.meta.opened_from_day_key = Some(prior_day.clone());

    persist_record(db, &record)?;
    info!(
        event_id = %event_id,
        day_key = %today,
        from_day = %prior_day,
        "Opened cash day from previous close"
    );
    Ok(record)
}

// ===========================================================================
// Tests
// ===========================================================================
