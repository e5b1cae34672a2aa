// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Invoice ledger: creation, send, void and the overdue sweep. Every write
//! runs under the database write lock and bumps the invoice's version.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use crate::db::begin_write;
use crate::delivery::{self, DeliveryWarning, DocumentRenderer, NotificationDispatcher};
use crate::error::{LedgerError, LedgerResult};
use crate::lifecycle::{self, StatusFacts};
use crate::models::{
    Attachments, BillingPeriod, BillingSnapshot, DeliveryStatus, Invoice, InvoiceBalance, InvoiceEvent,
    InvoiceStatus, LineItem, NewLineItem,
};
use crate::profiles;
use crate::utils::{stored_date, stored_decimal, stored_instant};
use crate::work;

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub client: String,
    pub period: BillingPeriod,
    pub line_items: Vec<NewLineItem>,
    pub timesheet_refs: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub client: Option<String>,
}

/// Result of send/redeliver: the committed invoice plus any delivery
/// warnings. Once SENT is committed this is always returned, never an error.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub invoice: Invoice,
    pub warnings: Vec<DeliveryWarning>,
}

impl SendOutcome {
    pub fn delivery_pending(&self) -> bool {
        self.invoice.delivery_status != DeliveryStatus::Delivered
    }
}

fn next_invoice_number(conn: &Connection, year: i32) -> LedgerResult<String> {
    conn.execute(
        "INSERT INTO sequences(name, value) VALUES('invoice', 1)
         ON CONFLICT(name) DO UPDATE SET value=value+1",
        [],
    )?;
    let seq: i64 = conn.query_row(
        "SELECT value FROM sequences WHERE name='invoice'",
        [],
        |r| r.get(0),
    )?;
    Ok(format!("INV-{}-{:05}", year, seq))
}

fn priced_lines(lines: &[NewLineItem]) -> LedgerResult<(Vec<LineItem>, Decimal)> {
    if lines.is_empty() {
        return Err(LedgerError::validation("an invoice needs at least one line item"));
    }
    let mut priced = Vec::with_capacity(lines.len());
    let mut total = Decimal::ZERO;
    for (idx, line) in lines.iter().enumerate() {
        if line.consultant.trim().is_empty() {
            return Err(LedgerError::validation(format!("line {} has no consultant", idx + 1)));
        }
        if line.hours < Decimal::ZERO || line.bill_rate < Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "line {} ({}) has negative hours or rate",
                idx + 1,
                line.consultant
            )));
        }
        let amount = line.amount()?;
        total += amount;
        priced.push(LineItem {
            position: idx as u32 + 1,
            consultant: line.consultant.trim().to_string(),
            hours: line.hours,
            bill_rate: line.bill_rate,
            amount,
        });
    }
    if total.is_zero() {
        return Err(LedgerError::validation("invoice total is zero; nothing to bill"));
    }
    Ok((priced, total))
}

/// Create a DRAFT invoice. Line amounts are computed here, never supplied.
#[instrument(skip(conn, input), fields(client = %input.client, period = %input.period.label()))]
pub fn create_invoice(
    conn: &mut Connection,
    input: &NewInvoice,
    now: DateTime<Utc>,
) -> LedgerResult<Invoice> {
    let (lines, total) = priced_lines(&input.line_items)?;

    let tx = begin_write(conn)?;
    let profile = profiles::get_profile_by_name(&tx, input.client.trim())?;
    if !profile.active {
        return Err(LedgerError::validation(format!(
            "client '{}' is disabled",
            profile.name
        )));
    }

    {
        let mut stmt = tx.prepare(
            "SELECT number, period_kind, period_start, period_end FROM invoices
             WHERE client_id=?1 AND status != 'void'",
        )?;
        let rows = stmt.query_map(params![profile.id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (number, kind, start, end) = row?;
            let existing = BillingPeriod::from_stored(
                &kind,
                stored_date(&start, "period start")?,
                stored_date(&end, "period end")?,
            )?;
            if existing.overlaps(&input.period) {
                return Err(LedgerError::validation(format!(
                    "{} already bills {} for {}; void it before re-billing",
                    number,
                    profile.name,
                    existing.label()
                )));
            }
        }
    }

    let number = next_invoice_number(&tx, now.year())?;
    tx.execute(
        "INSERT INTO invoices(number, client_id, currency, period_kind, period_start, period_end,
             status, total, received, outstanding, timesheet_refs, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '0', ?9, ?10, ?11)",
        params![
            number,
            profile.id,
            profile.currency,
            input.period.kind(),
            input.period.start().to_string(),
            input.period.end().to_string(),
            InvoiceStatus::Draft.as_str(),
            total.to_string(),
            total.to_string(),
            serde_json::to_string(&input.timesheet_refs)?,
            now.to_rfc3339()
        ],
    )?;
    let id = tx.last_insert_rowid();
    for line in &lines {
        tx.execute(
            "INSERT INTO line_items(invoice_id, position, consultant, hours, bill_rate, amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                line.position,
                line.consultant,
                line.hours.to_string(),
                line.bill_rate.to_string(),
                line.amount.to_string()
            ],
        )?;
    }
    record_event(&tx, id, None, InvoiceStatus::Draft, now, None)?;
    tx.commit()?;

    info!(invoice = %number, total = %total, lines = lines.len(), "invoice drafted");
    get_invoice(conn, id)
}

/// Aggregate the client's approved timesheets for `period` into a DRAFT.
pub fn create_from_timesheets(
    conn: &mut Connection,
    client: &str,
    period: BillingPeriod,
    now: DateTime<Utc>,
) -> LedgerResult<Invoice> {
    let profile = profiles::get_profile_by_name(conn, client.trim())?;
    let snapshots = work::approved_snapshots(conn, &profile.name, &period)?;
    let line_items = work::aggregate_line_items(&snapshots, &profile.currency)?;
    if line_items.is_empty() {
        return Err(LedgerError::validation(format!(
            "no approved billable hours for {} in {}",
            profile.name,
            period.label()
        )));
    }
    let input = NewInvoice {
        client: profile.name,
        period,
        line_items,
        // only snapshots that produced a line support the invoice
        timesheet_refs: snapshots
            .iter()
            .filter(|s| s.hours > Decimal::ZERO)
            .map(|s| s.id)
            .collect(),
    };
    create_invoice(conn, &input, now)
}

/// DRAFT → SENT. The transition is claimed and committed first; rendering and
/// dispatch follow outside the write lock and only ever produce warnings.
#[instrument(skip(conn, renderer, dispatcher, note))]
pub fn send_invoice(
    conn: &mut Connection,
    id: i64,
    note: Option<&str>,
    renderer: &dyn DocumentRenderer,
    dispatcher: &dyn NotificationDispatcher,
    now: DateTime<Utc>,
) -> LedgerResult<SendOutcome> {
    let tx = begin_write(conn)?;
    let invoice = get_invoice(&tx, id)?;
    if !lifecycle::can_send(invoice.status) {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "send",
        });
    }
    let profile = profiles::get_profile(&tx, invoice.client_id)?;
    let snapshot = BillingSnapshot {
        emails: profile.primary_emails,
        cc: profile.cc_emails,
        address: profile.address,
        payment_terms: profile.payment_terms,
    };
    let due = lifecycle::due_date(now, snapshot.payment_terms);
    let changed = tx.execute(
        "UPDATE invoices SET status=?1, sent_at=?2, due_date=?3, billing_snapshot=?4, send_note=?5,
             delivery_status='pending', version=version+1
         WHERE id=?6 AND version=?7",
        params![
            InvoiceStatus::Sent.as_str(),
            now.to_rfc3339(),
            due.to_string(),
            serde_json::to_string(&snapshot)?,
            note,
            id,
            invoice.version
        ],
    )?;
    if changed != 1 {
        return Err(LedgerError::ConcurrencyConflict(invoice.number));
    }
    record_event(&tx, id, Some(InvoiceStatus::Draft), InvoiceStatus::Sent, now, note)?;
    tx.commit()?;
    info!(invoice = %invoice.number, due = %due, "invoice sent");

    // no fallible reads past the commit
    let mut sent = Invoice {
        status: InvoiceStatus::Sent,
        sent_at: Some(now),
        due_date: Some(due),
        billing: Some(snapshot),
        delivery_status: DeliveryStatus::Pending,
        version: invoice.version + 1,
        ..invoice
    };
    let warnings = delivery::deliver(conn, &mut sent, renderer, dispatcher, note, now);
    Ok(SendOutcome {
        invoice: sent,
        warnings,
    })
}

/// Cancel an invoice. Allowed from every state except PAID and VOID.
#[instrument(skip(conn, reason))]
pub fn void_invoice(
    conn: &mut Connection,
    id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Invoice> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::validation("a void reason is required"));
    }
    let tx = begin_write(conn)?;
    let invoice = get_invoice(&tx, id)?;
    if !lifecycle::can_void(invoice.status) {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "void",
        });
    }
    let changed = tx.execute(
        "UPDATE invoices SET status=?1, voided_at=?2, void_reason=?3, version=version+1
         WHERE id=?4 AND version=?5",
        params![
            InvoiceStatus::Void.as_str(),
            now.to_rfc3339(),
            reason,
            id,
            invoice.version
        ],
    )?;
    if changed != 1 {
        return Err(LedgerError::ConcurrencyConflict(invoice.number));
    }
    record_event(&tx, id, Some(invoice.status), InvoiceStatus::Void, now, Some(reason))?;
    tx.commit()?;
    info!(invoice = %invoice.number, from = %invoice.status, "invoice voided");
    get_invoice(conn, id)
}

/// Move every past-due, unpaid SENT/PARTIALLY_PAID invoice to OVERDUE.
#[instrument(skip(conn))]
pub fn sweep_overdue(
    conn: &mut Connection,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<InvoiceBalance>> {
    let tx = begin_write(conn)?;
    let candidates: Vec<i64> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM invoices WHERE status IN ('sent','partially_paid')
             AND due_date IS NOT NULL AND due_date < ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![today.to_string()], |r| r.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut moved = Vec::new();
    for id in candidates {
        let invoice = get_invoice(&tx, id)?;
        let next = lifecycle::after_sweep(&facts_of(&invoice), today);
        if next == invoice.status {
            continue;
        }
        let changed = tx.execute(
            "UPDATE invoices SET status=?1, version=version+1 WHERE id=?2 AND version=?3",
            params![next.as_str(), id, invoice.version],
        )?;
        if changed != 1 {
            return Err(LedgerError::ConcurrencyConflict(invoice.number));
        }
        record_event(&tx, id, Some(invoice.status), next, now, Some("overdue sweep"))?;
        let mut balance = invoice.balance();
        balance.status = next;
        moved.push(balance);
    }
    tx.commit()?;
    info!(count = moved.len(), as_of = %today, "overdue sweep finished");
    Ok(moved)
}

/// Regenerate the document for an issued invoice.
pub fn rerender_invoice(
    conn: &Connection,
    id: i64,
    renderer: &dyn DocumentRenderer,
    now: DateTime<Utc>,
) -> LedgerResult<(Invoice, Option<DeliveryWarning>)> {
    let mut invoice = get_invoice(conn, id)?;
    if matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Void) {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "render",
        });
    }
    let (_, warning) = delivery::render_document(conn, &mut invoice, renderer, now);
    Ok((invoice, warning))
}

/// Retry delivery for an issued invoice whose earlier delivery did not finish.
pub fn redeliver_invoice(
    conn: &Connection,
    id: i64,
    renderer: &dyn DocumentRenderer,
    dispatcher: &dyn NotificationDispatcher,
    now: DateTime<Utc>,
) -> LedgerResult<SendOutcome> {
    let mut invoice = get_invoice(conn, id)?;
    if invoice.sent_at.is_none() || invoice.status == InvoiceStatus::Void {
        return Err(LedgerError::InvalidState {
            invoice: invoice.number,
            status: invoice.status,
            action: "redeliver",
        });
    }
    if invoice.delivery_status == DeliveryStatus::Delivered {
        return Err(LedgerError::validation(format!(
            "{} was already delivered",
            invoice.number
        )));
    }
    let note: Option<String> = conn.query_row(
        "SELECT send_note FROM invoices WHERE id=?1",
        params![id],
        |r| r.get(0),
    )?;
    let warnings = delivery::deliver(conn, &mut invoice, renderer, dispatcher, note.as_deref(), now);
    Ok(SendOutcome { invoice, warnings })
}

pub(crate) fn facts_of(invoice: &Invoice) -> StatusFacts {
    StatusFacts {
        current: invoice.status,
        sent: invoice.sent_at.is_some(),
        voided: invoice.voided_at.is_some(),
        total: invoice.total,
        received: invoice.received,
        due_date: invoice.due_date,
    }
}

pub(crate) fn record_event(
    conn: &Connection,
    invoice_id: i64,
    from: Option<InvoiceStatus>,
    to: InvoiceStatus,
    at: DateTime<Utc>,
    detail: Option<&str>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO invoice_events(invoice_id, from_status, to_status, at, detail)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            invoice_id,
            from.map(|s| s.as_str()),
            to.as_str(),
            at.to_rfc3339(),
            detail
        ],
    )?;
    Ok(())
}

const COLUMNS: &str = "i.id, i.number, i.client_id, c.name, i.currency, i.period_kind, i.period_start,
     i.period_end, i.status, i.total, i.received, i.outstanding, i.due_date, i.sent_at, i.voided_at,
     i.void_reason, i.billing_snapshot, i.document_ref, i.timesheet_refs, i.delivery_status,
     i.version, i.created_at";

struct RawInvoice {
    id: i64,
    number: String,
    client_id: i64,
    client_name: String,
    currency: String,
    period_kind: String,
    period_start: String,
    period_end: String,
    status: String,
    total: String,
    received: String,
    outstanding: String,
    due_date: Option<String>,
    sent_at: Option<String>,
    voided_at: Option<String>,
    void_reason: Option<String>,
    billing_snapshot: Option<String>,
    document_ref: Option<String>,
    timesheet_refs: String,
    delivery_status: String,
    version: i64,
    created_at: String,
}

fn raw_row(r: &Row<'_>) -> rusqlite::Result<RawInvoice> {
    Ok(RawInvoice {
        id: r.get(0)?,
        number: r.get(1)?,
        client_id: r.get(2)?,
        client_name: r.get(3)?,
        currency: r.get(4)?,
        period_kind: r.get(5)?,
        period_start: r.get(6)?,
        period_end: r.get(7)?,
        status: r.get(8)?,
        total: r.get(9)?,
        received: r.get(10)?,
        outstanding: r.get(11)?,
        due_date: r.get(12)?,
        sent_at: r.get(13)?,
        voided_at: r.get(14)?,
        void_reason: r.get(15)?,
        billing_snapshot: r.get(16)?,
        document_ref: r.get(17)?,
        timesheet_refs: r.get(18)?,
        delivery_status: r.get(19)?,
        version: r.get(20)?,
        created_at: r.get(21)?,
    })
}

fn decode(conn: &Connection, raw: RawInvoice) -> LedgerResult<Invoice> {
    let status = raw
        .status
        .parse::<InvoiceStatus>()
        .map_err(|_| LedgerError::Corrupt(format!("invoice status '{}'", raw.status)))?;
    let period = BillingPeriod::from_stored(
        &raw.period_kind,
        stored_date(&raw.period_start, "period start")?,
        stored_date(&raw.period_end, "period end")?,
    )?;
    let billing = match raw.billing_snapshot {
        Some(ref s) => Some(serde_json::from_str::<BillingSnapshot>(s)?),
        None => None,
    };
    Ok(Invoice {
        id: raw.id,
        line_items: line_items(conn, raw.id)?,
        number: raw.number,
        client_id: raw.client_id,
        client_name: raw.client_name,
        currency: raw.currency,
        period,
        status,
        total: stored_decimal(&raw.total, "invoice total")?,
        received: stored_decimal(&raw.received, "invoice received")?,
        outstanding: stored_decimal(&raw.outstanding, "invoice outstanding")?,
        due_date: raw
            .due_date
            .as_deref()
            .map(|d| stored_date(d, "due date"))
            .transpose()?,
        sent_at: raw
            .sent_at
            .as_deref()
            .map(|d| stored_instant(d, "sent_at"))
            .transpose()?,
        voided_at: raw
            .voided_at
            .as_deref()
            .map(|d| stored_instant(d, "voided_at"))
            .transpose()?,
        void_reason: raw.void_reason,
        billing,
        attachments: Attachments {
            invoice_document: raw.document_ref,
            timesheets: serde_json::from_str(&raw.timesheet_refs)?,
        },
        delivery_status: raw.delivery_status.parse::<DeliveryStatus>()?,
        version: raw.version,
        created_at: stored_instant(&raw.created_at, "created_at")?,
    })
}

fn line_items(conn: &Connection, invoice_id: i64) -> LedgerResult<Vec<LineItem>> {
    let mut stmt = conn.prepare(
        "SELECT position, consultant, hours, bill_rate, amount FROM line_items
         WHERE invoice_id=?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![invoice_id], |r| {
        Ok((
            r.get::<_, u32>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (position, consultant, hours, rate, amount) = row?;
        out.push(LineItem {
            position,
            consultant,
            hours: stored_decimal(&hours, "line hours")?,
            bill_rate: stored_decimal(&rate, "line bill rate")?,
            amount: stored_decimal(&amount, "line amount")?,
        });
    }
    Ok(out)
}

pub fn get_invoice(conn: &Connection, id: i64) -> LedgerResult<Invoice> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {} FROM invoices i JOIN clients c ON c.id=i.client_id WHERE i.id=?1",
                COLUMNS
            ),
            params![id],
            raw_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::NotFound(format!("invoice #{}", id)))?;
    decode(conn, raw)
}

pub fn get_invoice_by_number(conn: &Connection, number: &str) -> LedgerResult<Invoice> {
    let id = crate::utils::id_for_invoice(conn, number.trim())?;
    get_invoice(conn, id)
}

pub fn list_invoices(conn: &Connection, filter: &InvoiceFilter) -> LedgerResult<Vec<Invoice>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM invoices i JOIN clients c ON c.id=i.client_id
         WHERE (?1 IS NULL OR i.status=?1) AND (?2 IS NULL OR c.name=?2)
         ORDER BY i.id DESC",
        COLUMNS
    ))?;
    let raws: Vec<RawInvoice> = stmt
        .query_map(
            params![filter.status.map(|s| s.as_str()), filter.client.as_deref()],
            raw_row,
        )?
        .collect::<rusqlite::Result<_>>()?;
    raws.into_iter().map(|raw| decode(conn, raw)).collect()
}

/// Issued (SENT or later, never VOID) invoices whose billing period starts
/// within `[start, end]`.
pub fn issued_in_period(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> LedgerResult<Vec<Invoice>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM invoices i JOIN clients c ON c.id=i.client_id
         WHERE i.status IN ('sent','partially_paid','paid','overdue')
           AND i.period_start BETWEEN ?1 AND ?2
         ORDER BY i.period_start, i.id",
        COLUMNS
    ))?;
    let raws: Vec<RawInvoice> = stmt
        .query_map(params![start.to_string(), end.to_string()], raw_row)?
        .collect::<rusqlite::Result<_>>()?;
    raws.into_iter().map(|raw| decode(conn, raw)).collect()
}

pub fn invoice_events(conn: &Connection, id: i64) -> LedgerResult<Vec<InvoiceEvent>> {
    let mut stmt = conn.prepare(
        "SELECT from_status, to_status, at, detail FROM invoice_events
         WHERE invoice_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id], |r| {
        Ok((
            r.get::<_, Option<String>>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<String>>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (from, to, at, detail) = row?;
        out.push(InvoiceEvent {
            at: stored_instant(&at, "event time")?,
            from: from
                .as_deref()
                .map(str::parse::<InvoiceStatus>)
                .transpose()?,
            to: to.parse::<InvoiceStatus>()?,
            detail,
        });
    }
    Ok(out)
}
