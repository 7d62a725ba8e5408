//! Error taxonomy for the cash subsystem.
//!
//! Callers need to phrase failures differently depending on what went wrong:
//! a business-rule rejection ("fix your counts first") is not the same
//! conversation as a locked database file ("close the other instance") or a
//! rolled-back transaction ("nothing was saved, try again"). Every public
//! operation in this crate returns [`CashResult`] so the category survives
//! all the way to the caller.

use thiserror::Error;

/// Result alias used across the crate.
pub type CashResult<T> = Result<T, CashError>;

/// Failure categories for cash-day operations.
#[derive(Debug, Error)]
pub enum CashError {
    /// A business rule rejected the operation. The message names the exact
    /// precondition that failed and is suitable for showing to the operator.
    /// Validation errors are raised before anything is written.
    #[error("{0}")]
    Validation(String),

    /// The database is locked or busy — typically another process holding
    /// the file, or an in-flight operation on the same day. Retryable.
    #[error("database busy: {0}")]
    Busy(String),

    /// An infrastructure failure in the storage layer (I/O, corruption,
    /// constraint violation outside a combined write).
    #[error("storage: {0}")]
    Storage(String),

    /// A combined write (close, reopen) failed partway and was rolled back
    /// in its entirety. Nothing was persisted; the record is exactly as it
    /// was before the attempt.
    #[error("{op} was rolled back, nothing was saved: {cause}")]
    TxAborted { op: &'static str, cause: String },
}

impl CashError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CashError::Validation(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        CashError::Busy(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        CashError::Storage(msg.into())
    }

    pub fn tx_aborted(op: &'static str, cause: impl Into<String>) -> Self {
        CashError::TxAborted {
            op,
            cause: cause.into(),
        }
    }

    /// True when the failure is a business-rule rejection rather than an
    /// infrastructure problem.
    pub fn is_validation(&self) -> bool {
        matches!(self, CashError::Validation(_))
    }

    /// True when retrying later (or closing another instance) could help.
    pub fn is_busy(&self) -> bool {
        matches!(self, CashError::Busy(_))
    }
}

impl From<rusqlite::Error> for CashError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                CashError::Busy(e.to_string())
            }
            _ => CashError::Storage(e.to_string()),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
