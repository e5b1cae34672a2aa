// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Payout feed: money paid out to consultants. Read-only to the ledger apart
//! from loading the feed.

use chrono::NaiveDate;
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Payout, PayoutStatus};
use crate::utils::{stored_date, stored_decimal};

#[derive(Debug, Clone)]
pub struct PayoutInput {
    pub consultant: String,
    pub client: Option<String>,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub processed_at: Option<NaiveDate>,
    pub reference: Option<String>,
}

pub fn record_payout(conn: &Connection, input: &PayoutInput) -> LedgerResult<i64> {
    if input.consultant.trim().is_empty() {
        return Err(LedgerError::validation("payout consultant is required"));
    }
    if input.amount < Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "payout amount must not be negative, got {}",
            input.amount
        )));
    }
    if input.status == PayoutStatus::Processed && input.processed_at.is_none() {
        return Err(LedgerError::validation(
            "processed payouts need a processed date",
        ));
    }
    conn.execute(
        "INSERT INTO payouts(consultant, client, amount, status, processed_at, reference)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            input.consultant.trim(),
            input.client.as_deref().map(str::trim),
            input.amount.to_string(),
            input.status.as_str(),
            input.processed_at.map(|d| d.to_string()),
            input.reference.as_deref()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

type RawPayout = (
    i64,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
);

fn raw_row(r: &Row<'_>) -> rusqlite::Result<RawPayout> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
    ))
}

fn decode(raw: RawPayout) -> LedgerResult<Payout> {
    let (id, consultant, client, amount, status, processed_at, reference) = raw;
    Ok(Payout {
        id,
        consultant,
        client,
        amount: stored_decimal(&amount, "payout amount")?,
        status: status
            .parse()
            .map_err(|_| LedgerError::Corrupt(format!("payout status '{}'", status)))?,
        processed_at: processed_at
            .as_deref()
            .map(|d| stored_date(d, "payout processed_at"))
            .transpose()?,
        reference,
    })
}

/// Processed payouts whose processed date falls in `[start, end]`.
pub fn processed_payouts(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
) -> LedgerResult<Vec<Payout>> {
    let mut stmt = conn.prepare(
        "SELECT id, consultant, client, amount, status, processed_at, reference FROM payouts
         WHERE status='processed' AND processed_at>=?1 AND processed_at<=?2
         ORDER BY processed_at, id",
    )?;
    let rows = stmt.query_map(params![start.to_string(), end.to_string()], raw_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

pub fn list_payouts(conn: &Connection) -> LedgerResult<Vec<Payout>> {
    let mut stmt = conn.prepare(
        "SELECT id, consultant, client, amount, status, processed_at, reference FROM payouts
         ORDER BY COALESCE(processed_at, created_at) DESC, id DESC",
    )?;
    let rows = stmt.query_map([], raw_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}
