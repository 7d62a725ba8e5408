//! Event registry and lock flags.
//!
//! Cash days hang off events (ferias, market weekends, the permanent store).
//! An event with `closed_at` set is archived: none of its days can be closed
//! or reopened anymore. Separately, a day lock blocks closing a single
//! (event, day) without touching the rest of the event.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{self, DbState};
use crate::error::{CashError, CashResult};

const SETTINGS_CATEGORY: &str = "system";
const ACTIVE_EVENT_KEY: &str = "active_event_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    pub id: String,
    pub name: String,
    pub closed_at: Option<String>,
}

/// Create or rename an event.
pub fn upsert_event(db: &DbState, id: &str, name: &str) -> CashResult<()> {
    if id.trim().is_empty() {
        return Err(CashError::validation("event id is required"));
    }
    if name.trim().is_empty() {
        return Err(CashError::validation("event name is required"));
    }
    let conn = db.lock_conn()?;
    conn.execute(
        "INSERT INTO events (id, name, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            updated_at = excluded.updated_at",
        params![id.trim(), name.trim()],
    )?;
    info!(event_id = %id.trim(), name = %name.trim(), "Event upserted");
    Ok(())
}

pub fn get_event(conn: &Connection, id: &str) -> CashResult<Option<EventInfo>> {
    conn.query_row(
        "SELECT id, name, closed_at FROM events WHERE id = ?1",
        params![id],
        |row| {
            Ok(EventInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                closed_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(CashError::from)
}

/// All events, most recently updated first.
pub fn list_events(db: &DbState) -> CashResult<Vec<EventInfo>> {
    let conn = db.lock_conn()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, closed_at FROM events ORDER BY updated_at DESC, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(EventInfo {
            id: row.get(0)?,
            name: row.get(1)?,
            closed_at: row.get(2)?,
        })
    })?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Archive or un-archive an event. Archived events refuse all close and
/// reopen operations on their days.
pub fn set_event_closed(db: &DbState, id: &str, closed: bool) -> CashResult<()> {
    let conn = db.lock_conn()?;
    if get_event(&conn, id)?.is_none() {
        return Err(CashError::validation(format!("unknown event: {id}")));
    }
    let closed_at = closed.then(|| Utc::now().to_rfc3339());
    conn.execute(
        "UPDATE events SET closed_at = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, closed_at],
    )?;
    info!(event_id = %id, closed = closed, "Event archive flag changed");
    Ok(())
}

/// The event the UI currently operates on, if any. A stale pointer (event
/// row deleted underneath the setting) reads as no active event.
pub fn get_active_event(db: &DbState) -> CashResult<Option<EventInfo>> {
    let conn = db.lock_conn()?;
    match db::get_setting(&conn, SETTINGS_CATEGORY, ACTIVE_EVENT_KEY) {
        None => Ok(None),
        Some(id) => get_event(&conn, &id),
    }
}

pub fn set_active_event(db: &DbState, id: &str) -> CashResult<()> {
    let conn = db.lock_conn()?;
    if get_event(&conn, id)?.is_none() {
        return Err(CashError::validation(format!("unknown event: {id}")));
    }
    db::set_setting(&conn, SETTINGS_CATEGORY, ACTIVE_EVENT_KEY, id)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

/// True when the owning event is archived. A missing event row is not a
/// lock: days can exist for events seeded elsewhere.
pub fn is_event_locked(conn: &Connection, event_id: &str) -> CashResult<bool> {
    Ok(get_event(conn, event_id)?
        .map(|e| e.closed_at.is_some())
        .unwrap_or(false))
}

/// True when a day lock row exists for (event, day).
pub fn is_day_locked(conn: &Connection, event_id: &str, day_key: &str) -> CashResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM day_locks WHERE event_id = ?1 AND day_key = ?2",
        params![event_id, day_key],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Set or clear the day lock for (event, day).
pub fn set_day_lock(
    db: &DbState,
    event_id: &str,
    day_key: &str,
    locked: bool,
    reason: Option<&str>,
) -> CashResult<()> {
    let conn = db.lock_conn()?;
    if locked {
        conn.execute(
            "INSERT INTO day_locks (event_id, day_key, reason) VALUES (?1, ?2, ?3)
             ON CONFLICT(event_id, day_key) DO UPDATE SET
                reason = excluded.reason,
                locked_at = datetime('now')",
            params![event_id, day_key, reason],
        )?;
    } else {
        conn.execute(
            "DELETE FROM day_locks WHERE event_id = ?1 AND day_key = ?2",
            params![event_id, day_key],
        )?;
    }
    info!(event_id = %event_id, day_key = %day_key, locked = locked, "Day lock changed");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
