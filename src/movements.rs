//! Cash movement ledger.
//!
//! Movements are deposits (IN), withdrawals (OUT), and signed corrections
//! (ADJUST) recorded against an open cash day. The ledger is append-only:
//! the subsystem offers no way to delete a movement, and the append sequence
//! is carried verbatim into every close snapshot.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::cashday::{self, CashDayRecord, DayStatus};
use crate::db::DbState;
use crate::error::{CashError, CashResult};
use crate::money::{round_money, Currency};

/// Movement kind. Amount rules differ per kind: IN and OUT carry positive
/// whole magnitudes, ADJUST carries a signed non-zero whole amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    In,
    Out,
    Adjust,
}

impl MovementKind {
    pub fn parse(s: &str) -> Option<MovementKind> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(MovementKind::In),
            "OUT" => Some(MovementKind::Out),
            "ADJUST" => Some(MovementKind::Adjust),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
            MovementKind::Adjust => "ADJUST",
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    /// Epoch milliseconds.
    pub ts: i64,
    pub kind: MovementKind,
    pub currency: Currency,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Movement {
    /// Build a new entry with a fresh id and the current timestamp. The
    /// amount must already be validated.
    pub fn new(kind: MovementKind, currency: Currency, amount: f64, note: Option<String>) -> Self {
        Movement {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now().timestamp_millis(),
            kind,
            currency,
            amount,
            note,
        }
    }
}

/// Validate and normalize a movement amount for the given kind.
///
/// IN/OUT: truncated to a whole number, absolute-valued, must end up > 0.
/// ADJUST: truncated to a whole number, sign preserved, must be non-zero.
fn validate_amount(kind: MovementKind, amount: f64) -> CashResult<f64> {
    if !amount.is_finite() {
        return Err(CashError::validation("Movement amount is not a valid number"));
    }
    match kind {
        MovementKind::In | MovementKind::Out => {
            let a = amount.trunc().abs();
            if a <= 0.0 {
                return Err(CashError::validation(format!(
                    "{} amount must be a positive whole number",
                    kind.code()
                )));
            }
            Ok(a)
        }
        MovementKind::Adjust => {
            let a = amount.trunc();
            if a == 0.0 {
                return Err(CashError::validation(
                    "ADJUST amount must be a non-zero whole number",
                ));
            }
            Ok(a)
        }
    }
}

/// Append a movement to the (event, day) record.
///
/// Validates the amount, ensures the record exists, rejects closed days, and
/// persists through the regular save path. Returns the updated record and
/// the appended entry. A rejected amount never touches storage, so it cannot
/// create the day record as a side effect.
pub fn add_movement(
    db: &DbState,
    event_id: &str,
    day_key: &str,
    kind: MovementKind,
    currency: Currency,
    amount: f64,
    note: Option<String>,
) -> CashResult<(CashDayRecord, Movement)> {
    let amount = validate_amount(kind, amount)?;

    let mut record = cashday::ensure(db, event_id, day_key)?;
    if record.status == DayStatus::Closed {
        return Err(CashError::validation(
            "Cannot add a movement to a closed day",
        ));
    }
    let note = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let movement = Movement::new(kind, currency, amount, note);

    record.movements.push(movement.clone());
    let saved = cashday::save(db, record)?;

    info!(
        event_id = %event_id,
        day_key = %day_key,
        kind = %movement.kind.code(),
        currency = %movement.currency,
        amount = movement.amount,
        "Movement recorded"
    );

    Ok((saved, movement))
}

// ---------------------------------------------------------------------------
// Sums
// ---------------------------------------------------------------------------

/// Per-currency movement sums. All three buckets are non-negative except
/// `adjust`, which keeps its sign.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementTotals {
    #[serde(rename = "in")]
    pub inflow: f64,
    #[serde(rename = "out")]
    pub outflow: f64,
    pub adjust: f64,
}

/// Partition and sum movements for one currency.
///
/// IN/OUT magnitudes are taken as absolute values regardless of stored sign
/// (legacy records sometimes carry negative OUT amounts); ADJUST keeps its
/// sign. Non-finite stored amounts count as 0.
pub fn sum_movements_by_currency(movements: &[Movement], currency: Currency) -> MovementTotals {
    let mut totals = MovementTotals::default();
    for m in movements {
        if m.currency != currency {
            continue;
        }
        let amount = if m.amount.is_finite() { m.amount } else { 0.0 };
        match m.kind {
            MovementKind::In => totals.inflow += amount.abs(),
            MovementKind::Out => totals.outflow += amount.abs(),
            MovementKind::Adjust => totals.adjust += amount,
        }
    }
    totals.inflow = round_money(totals.inflow);
    totals.outflow = round_money(totals.outflow);
    totals.adjust = round_money(totals.adjust);
    totals
}

/// Net drawer effect of the movements for one currency.
pub fn net_for_currency(movements: &[Movement], currency: Currency) -> f64 {
    let t = sum_movements_by_currency(movements, currency);
    round_money(t.inflow - t.outflow + t.adjust)
}

// ===========================================================================
// Tests
// ===========================================================================
