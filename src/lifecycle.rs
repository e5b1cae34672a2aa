// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Invoice status rules. Every status the ledger persists is produced by one
//! of these functions; nothing else decides what an invoice's status is.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::models::InvoiceStatus;

/// Inputs the status is a function of.
#[derive(Debug, Clone, Copy)]
pub struct StatusFacts {
    pub current: InvoiceStatus,
    pub sent: bool,
    pub voided: bool,
    pub total: Decimal,
    pub received: Decimal,
    pub due_date: Option<NaiveDate>,
}

impl StatusFacts {
    pub fn outstanding(&self) -> Decimal {
        self.total - self.received
    }
}

/// Status after a payment event has been applied to `facts.received`.
pub fn after_payment(facts: &StatusFacts) -> InvoiceStatus {
    if facts.voided {
        return InvoiceStatus::Void;
    }
    if !facts.sent {
        return InvoiceStatus::Draft;
    }
    if facts.current == InvoiceStatus::Paid || facts.outstanding().is_zero() {
        return InvoiceStatus::Paid;
    }
    if facts.received > Decimal::ZERO {
        return InvoiceStatus::PartiallyPaid;
    }
    facts.current
}

/// Status after the periodic overdue evaluation on `today`.
pub fn after_sweep(facts: &StatusFacts, today: NaiveDate) -> InvoiceStatus {
    match (facts.current, facts.due_date) {
        (InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid, Some(due))
            if !facts.voided && today > due && facts.outstanding() > Decimal::ZERO =>
        {
            InvoiceStatus::Overdue
        }
        (current, _) => current,
    }
}

/// Send is only legal from DRAFT.
pub fn can_send(current: InvoiceStatus) -> bool {
    current == InvoiceStatus::Draft
}

/// Void is legal from every non-terminal state.
pub fn can_void(current: InvoiceStatus) -> bool {
    !current.is_terminal()
}

pub fn due_date(sent_at: DateTime<Utc>, payment_terms: u32) -> NaiveDate {
    sent_at.date_naive() + Duration::days(i64::from(payment_terms))
}
