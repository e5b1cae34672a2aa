// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Read-only projections: the revenue ledger rollup and the receivables
//! dashboard. Nothing here is persisted; everything is recomputed from
//! invoices, payments and payouts.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{Connection, params};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::invoices::{InvoiceFilter, issued_in_period, list_invoices};
use crate::models::{BillingPeriod, InvoiceStatus, RevenuePeriodEntry};
use crate::payouts::processed_payouts;
use crate::utils::stored_decimal;

pub const UNASSIGNED_CLIENT: &str = "(unassigned)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotals {
    pub month: String,
    pub revenue: Decimal,
    pub payout: Decimal,
    pub margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub currency: String,
    pub revenue: Decimal,
    pub payout: Decimal,
    pub margin: Decimal,
    pub margin_pct: Decimal,
    pub invoices_counted: usize,
    pub foreign_invoices_skipped: usize,
    pub months: Vec<MonthTotals>,
    pub entries: Vec<RevenuePeriodEntry>,
}

/// First day of `from` through last day of `to`, both `YYYY-MM`.
pub fn month_span(from: &str, to: &str) -> LedgerResult<(NaiveDate, NaiveDate)> {
    let first = BillingPeriod::month(from)?;
    let last = BillingPeriod::month(to)?;
    if last.start() < first.start() {
        return Err(LedgerError::validation(format!(
            "month range {}..{} is reversed",
            from, to
        )));
    }
    Ok((first.start(), last.end()))
}

pub fn margin_pct(net: Decimal, gross: Decimal) -> Decimal {
    if gross.is_zero() {
        return Decimal::ZERO;
    }
    (net * Decimal::ONE_HUNDRED / gross)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Default)]
struct EntryAcc {
    hours: Decimal,
    gross: Decimal,
    cost: Decimal,
}

/// Roll up issued invoices (attributed to their billing-period month) and
/// processed payouts over `[start, end]`. DRAFT and VOID invoices never count.
pub fn revenue_ledger(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    currency: &str,
) -> LedgerResult<RevenueSummary> {
    let mut entries: BTreeMap<(String, String, String), EntryAcc> = BTreeMap::new();
    let mut months: BTreeMap<String, MonthTotals> = BTreeMap::new();
    let mut revenue = Decimal::ZERO;
    let mut counted = 0usize;
    let mut skipped = 0usize;

    for invoice in issued_in_period(conn, start, end)? {
        let period_start = invoice.period.start();
        if !invoice.currency.eq_ignore_ascii_case(currency) {
            skipped += 1;
            continue;
        }
        counted += 1;
        revenue += invoice.total;
        let month = period_start.format("%Y-%m").to_string();
        month_entry(&mut months, &month).revenue += invoice.total;
        for line in &invoice.line_items {
            let acc = entries
                .entry((month.clone(), line.consultant.clone(), invoice.client_name.clone()))
                .or_default();
            acc.hours += line.hours;
            acc.gross += line.amount;
        }
    }

    let mut payout = Decimal::ZERO;
    for p in processed_payouts(conn, start, end)? {
        let Some(date) = p.processed_at else { continue };
        let month = date.format("%Y-%m").to_string();
        payout += p.amount;
        month_entry(&mut months, &month).payout += p.amount;
        let client = p.client.unwrap_or_else(|| UNASSIGNED_CLIENT.to_string());
        entries
            .entry((month, p.consultant, client))
            .or_default()
            .cost += p.amount;
    }

    let months: Vec<MonthTotals> = months
        .into_values()
        .map(|mut m| {
            m.margin = m.revenue - m.payout;
            m
        })
        .collect();
    let entries: Vec<RevenuePeriodEntry> = entries
        .into_iter()
        .map(|((month, consultant, client), acc)| {
            let net = acc.gross - acc.cost;
            let bill_rate = if acc.hours.is_zero() {
                Decimal::ZERO
            } else {
                (acc.gross / acc.hours).round_dp(2)
            };
            RevenuePeriodEntry {
                month,
                consultant,
                client,
                hours: acc.hours,
                bill_rate,
                gross_revenue: acc.gross,
                consultant_cost: acc.cost,
                net_profit: net,
                margin_pct: margin_pct(net, acc.gross),
            }
        })
        .collect();

    let margin = revenue - payout;
    debug!(counted, skipped, entries = entries.len(), "revenue ledger computed");
    Ok(RevenueSummary {
        start,
        end,
        currency: currency.to_string(),
        revenue,
        payout,
        margin,
        margin_pct: margin_pct(margin, revenue),
        invoices_counted: counted,
        foreign_invoices_skipped: skipped,
        months,
        entries,
    })
}

fn month_entry<'a>(months: &'a mut BTreeMap<String, MonthTotals>, month: &str) -> &'a mut MonthTotals {
    months
        .entry(month.to_string())
        .or_insert_with(|| MonthTotals {
            month: month.to_string(),
            revenue: Decimal::ZERO,
            payout: Decimal::ZERO,
            margin: Decimal::ZERO,
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusBucket {
    pub status: InvoiceStatus,
    pub count: usize,
    pub total: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceDashboard {
    pub as_of: NaiveDate,
    pub buckets: Vec<StatusBucket>,
    pub receivables: Decimal,
    pub overdue_exposure: Decimal,
    pub received_in_window: Option<Decimal>,
}

/// Receivables snapshot as of `as_of`. `window` limits the received figure to
/// payments whose received date falls inside it.
pub fn dashboard(
    conn: &Connection,
    as_of: NaiveDate,
    window: Option<(NaiveDate, NaiveDate)>,
) -> LedgerResult<FinanceDashboard> {
    let mut buckets: Vec<StatusBucket> = InvoiceStatus::ALL
        .iter()
        .map(|s| StatusBucket {
            status: *s,
            count: 0,
            total: Decimal::ZERO,
            outstanding: Decimal::ZERO,
        })
        .collect();
    let mut receivables = Decimal::ZERO;
    let mut overdue = Decimal::ZERO;

    for invoice in list_invoices(conn, &InvoiceFilter::default())? {
        if let Some(b) = buckets.iter_mut().find(|b| b.status == invoice.status) {
            b.count += 1;
            b.total += invoice.total;
            if invoice.status.accepts_payment() {
                b.outstanding += invoice.outstanding;
            }
        }
        if invoice.status.accepts_payment() {
            receivables += invoice.outstanding;
            if invoice.due_date.is_some_and(|due| as_of > due) {
                overdue += invoice.outstanding;
            }
        }
    }

    let received_in_window = match window {
        Some((from, to)) => {
            let mut stmt = conn.prepare(
                "SELECT p.amount FROM payments p JOIN invoices i ON i.id=p.invoice_id
                 WHERE p.received_date>=?1 AND p.received_date<=?2 AND i.status != 'void'",
            )?;
            let rows = stmt.query_map(params![from.to_string(), to.to_string()], |r| {
                r.get::<_, String>(0)
            })?;
            let mut sum = Decimal::ZERO;
            for row in rows {
                sum += stored_decimal(&row?, "payment amount")?;
            }
            Some(sum)
        }
        None => None,
    };

    Ok(FinanceDashboard {
        as_of,
        buckets,
        receivables,
        overdue_exposure: overdue,
        received_in_window,
    })
}
