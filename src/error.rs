// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::ErrorCode;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::InvoiceStatus;

/// Typed failures surfaced by the ledger. Every hard error aborts the
/// operation with no partial state change.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot {action} invoice {invoice} while it is {status}")]
    InvalidState {
        invoice: String,
        status: InvoiceStatus,
        action: &'static str,
    },

    #[error("payment of {amount} exceeds outstanding balance {outstanding} on {invoice}")]
    Overpayment {
        invoice: String,
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("concurrent update on {0}; retry the operation")]
    ConcurrencyConflict(String),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    /// Lost races are the only failures worth repeating unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                LedgerError::ConcurrencyConflict(err.to_string())
            }
            other => LedgerError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Corrupt(err.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
