//! Expected-vs-counted reconciliation.
//!
//! Pure arithmetic over a cash day record: what should be in the drawer
//! (initial + movements + local cash sales) against what was counted. Every
//! quantity is rounded to 2 decimals at each step so repeated recomputation
//! cannot drift.

use serde::{Deserialize, Serialize};

use crate::cashday::{self, CashDayRecord};
use crate::db::DbState;
use crate::error::CashResult;
use crate::money::{round_money, Currency};
use crate::movements::sum_movements_by_currency;
use crate::sales;

/// One currency's reconciliation lines, as shown on the close screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRecon {
    pub initial: f64,
    #[serde(rename = "in")]
    pub inflow: f64,
    #[serde(rename = "out")]
    pub outflow: f64,
    pub adjust: f64,
    /// Local cash sales; always 0 for the foreign currency.
    pub cash_sales: f64,
    pub expected: f64,
    /// The counted final total (0 while no final count is saved).
    pub counted: f64,
    pub diff: f64,
}

/// Full-day reconciliation summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayRecon {
    #[serde(rename = "NIO")]
    pub nio: CurrencyRecon,
    #[serde(rename = "USD")]
    pub usd: CurrencyRecon,
    #[serde(rename = "cashSalesC")]
    pub cash_sales_c: f64,
    pub fx: Option<f64>,
}

impl DayRecon {
    /// True when both currencies reconcile to exactly 0.00.
    pub fn is_balanced(&self) -> bool {
        self.nio.diff == 0.0 && self.usd.diff == 0.0
    }
}

/// Reconcile one currency of a record. `cash_sales_local` is only applied
/// to the local currency; for USD it is ignored no matter what is passed.
pub fn reconcile_currency(
    record: &CashDayRecord,
    currency: Currency,
    cash_sales_local: f64,
) -> CurrencyRecon {
    let initial = record
        .initial
        .as_ref()
        .map(|c| c.get(currency).total)
        .unwrap_or(0.0);
    let counted = record
        .final_count
        .as_ref()
        .map(|c| c.get(currency).total)
        .unwrap_or(0.0);
    let sums = sum_movements_by_currency(&record.movements, currency);
    let cash_sales = if currency.is_local() {
        round_money(cash_sales_local)
    } else {
        0.0
    };

    let expected = round_money(initial + sums.inflow - sums.outflow + cash_sales + sums.adjust);
    let diff = round_money(counted - expected);

    CurrencyRecon {
        initial: round_money(initial),
        inflow: sums.inflow,
        outflow: sums.outflow,
        adjust: sums.adjust,
        cash_sales,
        expected,
        counted: round_money(counted),
        diff,
    }
}

/// Reconcile both currencies of a record against a known local cash sales
/// figure. Pure; never touches storage.
pub fn reconcile_record(record: &CashDayRecord, cash_sales_local: f64) -> DayRecon {
    DayRecon {
        nio: reconcile_currency(record, Currency::Nio, cash_sales_local),
        usd: reconcile_currency(record, Currency::Usd, cash_sales_local),
        cash_sales_c: round_money(cash_sales_local),
        fx: record.fx,
    }
}

/// Reconcile the persisted record for (event, day): pure read of the record
/// plus a fresh sales scan. The stored `cashSalesC` cache is never trusted.
/// Returns None when no record exists.
pub fn reconcile_day(
    db: &DbState,
    event_id: &str,
    day_key: &str,
) -> CashResult<Option<DayRecon>> {
    let Some(record) = cashday::load(db, event_id, day_key)? else {
        return Ok(None);
    };
    let cash_sales = sales::cash_sales_local_or_zero(db, event_id, day_key);
    Ok(Some(reconcile_record(&record, cash_sales)))
}

// ===========================================================================
// Tests
// ===========================================================================
