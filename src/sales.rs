//! Read interface over the sales ledger.
//!
//! The sales table is written by the selling side of the application; this
//! module only scans it to answer one question: how much local-currency cash
//! entered the drawer from sales on a given (event, day). Courtesy rounds
//! and returns never touch the drawer, so they are excluded.

use rusqlite::{params, Connection};
use tracing::warn;

use crate::db::DbState;
use crate::error::{CashError, CashResult};
use crate::money::round_money;

/// Payment method string the sales side writes for drawer cash.
pub const CASH_METHOD: &str = "cash";

/// Sum of the day's cash-paid, non-courtesy, non-return sale totals for the
/// event, rounded to 2 decimals. Local currency only; the caller must never
/// apply this to USD.
pub fn cash_sales_local(conn: &Connection, event_id: &str, day_key: &str) -> CashResult<f64> {
    let sum: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(total), 0)
             FROM sales
             WHERE event_id = ?1
               AND sale_date = ?2
               AND payment_method = ?3
               AND COALESCE(is_courtesy, 0) = 0
               AND COALESCE(is_return, 0) = 0",
            params![event_id, day_key, CASH_METHOD],
            |row| row.get(0),
        )
        .map_err(CashError::from)?;
    Ok(round_money(sum))
}

/// Display-path variant: a failed scan degrades to 0 with a warning instead
/// of breaking the reconciliation view. The close operation uses the strict
/// [`cash_sales_local`] — there a scan failure must block the close.
pub fn cash_sales_local_or_zero(db: &DbState, event_id: &str, day_key: &str) -> f64 {
    let conn = match db.lock_conn() {
        Ok(conn) => conn,
        Err(e) => {
            warn!(event_id = %event_id, day_key = %day_key, error = %e, "Cash sales scan failed, showing 0");
            return 0.0;
        }
    };
    match cash_sales_local(&conn, event_id, day_key) {
        Ok(sum) => sum,
        Err(e) => {
            warn!(event_id = %event_id, day_key = %day_key, error = %e, "Cash sales scan failed, showing 0");
            0.0
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
