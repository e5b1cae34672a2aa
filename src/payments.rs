// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Payment reconciliation. `record_payment` is the only writer of an
//! invoice's received/outstanding figures and of the PARTIALLY_PAID/PAID
//! statuses.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use crate::db::begin_write;
use crate::error::{LedgerError, LedgerResult};
use crate::invoices::{facts_of, get_invoice, record_event};
use crate::lifecycle;
use crate::models::{InvoiceBalance, InvoiceStatus, NewPayment, Payment, PaymentMethod};
use crate::utils::{stored_date, stored_decimal, stored_instant};

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub invoice: InvoiceBalance,
}

/// Apply a payment to an issued invoice, atomically with the balance and
/// status recompute. Overpayment is rejected, never truncated.
#[instrument(skip(conn, input), fields(amount = %input.amount))]
pub fn record_payment(
    conn: &mut Connection,
    invoice_id: i64,
    input: &NewPayment,
    now: DateTime<Utc>,
) -> LedgerResult<PaymentReceipt> {
    if input.amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "payment amount must be positive, got {}",
            input.amount
        )));
    }
    if input.amount.normalize().scale() > 2 {
        return Err(LedgerError::validation(format!(
            "payment amount {} has more than 2 decimal places",
            input.amount
        )));
    }

    let tx = begin_write(conn)?;
    let invoice = get_invoice(&tx, invoice_id)?;
    // PAID has nothing outstanding, so a further payment is an overpayment
    let settled = invoice.status == InvoiceStatus::Paid;
    if !invoice.status.accepts_payment() && !settled {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "record a payment on",
        });
    }
    if input.amount > invoice.outstanding {
        return Err(LedgerError::Overpayment {
            invoice: invoice.number,
            amount: input.amount,
            outstanding: invoice.outstanding,
        });
    }
    if settled {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "record a payment on",
        });
    }

    tx.execute(
        "INSERT INTO payments(invoice_id, amount, received_date, method, reference, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            invoice_id,
            input.amount.to_string(),
            input.received_date.to_string(),
            input.method.as_str(),
            input.reference.as_deref(),
            input.notes.as_deref(),
            now.to_rfc3339()
        ],
    )?;
    let payment_id = tx.last_insert_rowid();

    let mut facts = facts_of(&invoice);
    facts.received = invoice.received + input.amount;
    let outstanding = facts.total - facts.received;
    let status = lifecycle::after_payment(&facts);

    let changed = tx.execute(
        "UPDATE invoices SET received=?1, outstanding=?2, status=?3, version=version+1
         WHERE id=?4 AND version=?5",
        params![
            facts.received.to_string(),
            outstanding.to_string(),
            status.as_str(),
            invoice_id,
            invoice.version
        ],
    )?;
    if changed != 1 {
        return Err(LedgerError::ConcurrencyConflict(invoice.number));
    }
    if status != invoice.status {
        let detail = format!("payment #{} of {}", payment_id, input.amount);
        record_event(&tx, invoice_id, Some(invoice.status), status, now, Some(&detail))?;
    }
    tx.commit()?;

    info!(
        invoice = %invoice.number,
        payment = payment_id,
        amount = %input.amount,
        outstanding = %outstanding,
        status = %status,
        "payment recorded"
    );

    Ok(PaymentReceipt {
        payment: Payment {
            id: payment_id,
            invoice_id,
            amount: input.amount,
            received_date: input.received_date,
            method: input.method,
            reference: input.reference.clone(),
            notes: input.notes.clone(),
            created_at: now,
        },
        invoice: InvoiceBalance {
            invoice_id,
            number: invoice.number,
            total: facts.total,
            received: facts.received,
            outstanding,
            status,
        },
    })
}

/// Payments for an invoice, oldest received first.
pub fn list_payments(conn: &Connection, invoice_id: i64) -> LedgerResult<Vec<Payment>> {
    // Surface an unknown invoice instead of an empty list.
    get_invoice(conn, invoice_id)?;
    let mut stmt = conn.prepare(
        "SELECT id, amount, received_date, method, reference, notes, created_at
         FROM payments WHERE invoice_id=?1 ORDER BY received_date, id",
    )?;
    let rows = stmt.query_map(params![invoice_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, String>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, amount, date, method, reference, notes, created) = row?;
        out.push(Payment {
            id,
            invoice_id,
            amount: stored_decimal(&amount, "payment amount")?,
            received_date: stored_date(&date, "payment date")?,
            method: method
                .parse::<PaymentMethod>()
                .map_err(|_| LedgerError::Corrupt(format!("payment method '{}'", method)))?,
            reference,
            notes,
            created_at: stored_instant(&created, "payment created_at")?,
        });
    }
    Ok(out)
}

/// Sum of recorded payments; always equal to the invoice's received amount.
pub fn payments_total(conn: &Connection, invoice_id: i64) -> LedgerResult<Decimal> {
    Ok(list_payments(conn, invoice_id)?
        .iter()
        .map(|p| p.amount)
        .sum())
}

/// True when an invoice is fully reconciled.
pub fn is_settled(balance: &InvoiceBalance) -> bool {
    balance.outstanding.is_zero() && balance.status == InvoiceStatus::Paid
}
