// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Work aggregation: approved timesheet snapshots become invoice lines.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{BillingPeriod, NewLineItem, TimesheetSnapshot};
use crate::utils::{stored_date, stored_decimal};

/// One approved record from the payroll/timesheet feed.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub consultant: String,
    pub client: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub hours: Decimal,
    pub bill_rate: Decimal,
    pub pay_rate: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Inserted(i64),
    Unchanged(i64),
}

/// Store an approved snapshot. Snapshots are immutable: re-recording an
/// identical row is a no-op, a differing one is rejected.
pub fn record_snapshot(conn: &Connection, input: &SnapshotInput) -> LedgerResult<SnapshotOutcome> {
    if input.consultant.trim().is_empty() || input.client.trim().is_empty() {
        return Err(LedgerError::validation("consultant and client are required"));
    }
    if input.period_end < input.period_start {
        return Err(LedgerError::validation(format!(
            "timesheet for {} ends before it starts",
            input.consultant
        )));
    }
    if input.hours < Decimal::ZERO || input.bill_rate < Decimal::ZERO || input.pay_rate < Decimal::ZERO
    {
        return Err(LedgerError::validation(format!(
            "timesheet for {} has negative hours or rate",
            input.consultant
        )));
    }
    let currency = input.currency.trim().to_uppercase();

    let existing = conn
        .query_row(
            &format!(
                "SELECT {} FROM timesheets WHERE consultant=?1 AND client=?2 AND period_start=?3 AND period_end=?4",
                COLUMNS
            ),
            params![
                input.consultant.trim(),
                input.client.trim(),
                input.period_start.to_string(),
                input.period_end.to_string()
            ],
            raw_row,
        )
        .optional()?;
    if let Some(raw) = existing {
        let snap = decode(raw)?;
        if snap.hours == input.hours
            && snap.bill_rate == input.bill_rate
            && snap.pay_rate == input.pay_rate
            && snap.currency == currency
        {
            return Ok(SnapshotOutcome::Unchanged(snap.id));
        }
        return Err(LedgerError::validation(format!(
            "approved timesheet #{} for {} / {} {}..{} already exists with different values",
            snap.id, snap.consultant, snap.client, snap.period_start, snap.period_end
        )));
    }

    conn.execute(
        "INSERT INTO timesheets(consultant, client, period_start, period_end, hours, bill_rate, pay_rate, currency)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            input.consultant.trim(),
            input.client.trim(),
            input.period_start.to_string(),
            input.period_end.to_string(),
            input.hours.to_string(),
            input.bill_rate.to_string(),
            input.pay_rate.to_string(),
            currency
        ],
    )?;
    Ok(SnapshotOutcome::Inserted(conn.last_insert_rowid()))
}

const COLUMNS: &str =
    "id, consultant, client, period_start, period_end, hours, bill_rate, pay_rate, currency";

type RawSnapshot = (i64, String, String, String, String, String, String, String, String);

fn raw_row(r: &Row<'_>) -> rusqlite::Result<RawSnapshot> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
    ))
}

fn decode(raw: RawSnapshot) -> LedgerResult<TimesheetSnapshot> {
    let (id, consultant, client, start, end, hours, bill, pay, currency) = raw;
    Ok(TimesheetSnapshot {
        id,
        consultant,
        client,
        period_start: stored_date(&start, "timesheet start")?,
        period_end: stored_date(&end, "timesheet end")?,
        hours: stored_decimal(&hours, "timesheet hours")?,
        bill_rate: stored_decimal(&bill, "timesheet bill rate")?,
        pay_rate: stored_decimal(&pay, "timesheet pay rate")?,
        currency,
    })
}

/// Approved snapshots for `client` that lie inside `period`.
pub fn approved_snapshots(
    conn: &Connection,
    client: &str,
    period: &BillingPeriod,
) -> LedgerResult<Vec<TimesheetSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM timesheets WHERE client=?1 AND period_start>=?2 AND period_end<=?3
         ORDER BY consultant, period_start, id",
        COLUMNS
    ))?;
    let rows = stmt.query_map(
        params![
            client,
            period.start().to_string(),
            period.end().to_string()
        ],
        raw_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        let snap = decode(row?)?;
        if period.covers(snap.period_start, snap.period_end) {
            out.push(snap);
        }
    }
    Ok(out)
}

pub fn list_snapshots(conn: &Connection, client: Option<&str>) -> LedgerResult<Vec<TimesheetSnapshot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM timesheets WHERE ?1 IS NULL OR client=?1 ORDER BY period_start DESC, consultant",
        COLUMNS
    ))?;
    let rows = stmt.query_map(params![client], raw_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

/// Collapse snapshots into invoice lines: one per consultant and stored bill
/// rate, zero-hour consultants dropped, ordered by consultant.
pub fn aggregate_line_items(
    snapshots: &[TimesheetSnapshot],
    currency: &str,
) -> LedgerResult<Vec<NewLineItem>> {
    let mut hours: BTreeMap<(String, Decimal), Decimal> = BTreeMap::new();
    for snap in snapshots {
        if !snap.currency.eq_ignore_ascii_case(currency) {
            return Err(LedgerError::validation(format!(
                "timesheet #{} is in {} but the client bills in {}",
                snap.id, snap.currency, currency
            )));
        }
        *hours
            .entry((snap.consultant.clone(), snap.bill_rate))
            .or_insert(Decimal::ZERO) += snap.hours;
    }

    let lines: Vec<NewLineItem> = hours
        .into_iter()
        .filter(|(_, h)| *h > Decimal::ZERO)
        .map(|((consultant, rate), h)| NewLineItem::new(consultant, h, rate))
        .collect();
    debug!(snapshots = snapshots.len(), lines = lines.len(), "aggregated work");
    Ok(lines)
}
