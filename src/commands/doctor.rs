// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::lifecycle;
use crate::models::{BillingSnapshot, InvoiceStatus, line_amount};
use crate::utils::{maybe_print_json, pretty_table, stored_date, stored_decimal, stored_instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub invoice: String,
    pub check: &'static str,
    pub detail: String,
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    let issues = check_ledger(conn)?;
    if maybe_print_json(m.get_flag("json"), m.get_flag("jsonl"), &issues)? {
        return Ok(());
    }
    if issues.is_empty() {
        println!("doctor: no issues found");
    } else {
        let rows = issues
            .iter()
            .map(|i| vec![i.invoice.clone(), i.check.to_string(), i.detail.clone()])
            .collect();
        println!("{}", pretty_table(&["Invoice", "Check", "Detail"], rows));
    }
    Ok(())
}

struct Row {
    id: i64,
    number: String,
    status: String,
    total: String,
    received: String,
    outstanding: String,
    due_date: Option<String>,
    sent_at: Option<String>,
    billing: Option<String>,
}

/// Re-derive every stored figure of every invoice. Read-only.
pub fn check_ledger(conn: &Connection) -> Result<Vec<Issue>> {
    let mut stmt = conn.prepare(
        "SELECT id, number, status, total, received, outstanding, due_date, sent_at, billing_snapshot
         FROM invoices ORDER BY id",
    )?;
    let invoices = stmt
        .query_map([], |r| {
            Ok(Row {
                id: r.get(0)?,
                number: r.get(1)?,
                status: r.get(2)?,
                total: r.get(3)?,
                received: r.get(4)?,
                outstanding: r.get(5)?,
                due_date: r.get(6)?,
                sent_at: r.get(7)?,
                billing: r.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let paid = payments_by_invoice(conn)?;
    let mut issues = Vec::new();
    for inv in &invoices {
        let mut report = |check: &'static str, detail: String| {
            issues.push(Issue {
                invoice: inv.number.clone(),
                check,
                detail,
            })
        };

        let figures = (
            stored_decimal(&inv.total, "total"),
            stored_decimal(&inv.received, "received"),
            stored_decimal(&inv.outstanding, "outstanding"),
            inv.status.parse::<InvoiceStatus>(),
        );
        let (total, received, outstanding, status) = match figures {
            (Ok(t), Ok(r), Ok(o), Ok(s)) => (t, r, o, s),
            (t, r, o, s) => {
                for e in [t.err(), r.err(), o.err(), s.err()].into_iter().flatten() {
                    report("unreadable", e.to_string());
                }
                continue;
            }
        };

        let mut line_sum = Decimal::ZERO;
        let mut lines = conn.prepare(
            "SELECT position, hours, bill_rate, amount FROM line_items WHERE invoice_id=?1 ORDER BY position",
        )?;
        let mut cur = lines.query(params![inv.id])?;
        while let Some(r) = cur.next()? {
            let position: i64 = r.get(0)?;
            let parsed = (
                stored_decimal(&r.get::<_, String>(1)?, "hours"),
                stored_decimal(&r.get::<_, String>(2)?, "bill_rate"),
                stored_decimal(&r.get::<_, String>(3)?, "amount"),
            );
            let (Ok(hours), Ok(rate), Ok(amount)) = parsed else {
                report("unreadable", format!("line {}", position));
                continue;
            };
            match line_amount(hours, rate) {
                Ok(expected) if expected != amount => report(
                    "line_amount",
                    format!("line {}: {} x {} = {}, stored {}", position, hours, rate, expected, amount),
                ),
                Err(e) => report("line_amount", format!("line {}: {}", position, e)),
                _ => {}
            }
            line_sum += amount;
        }
        if line_sum != total {
            report("total", format!("lines sum to {}, stored {}", line_sum, total));
        }

        let payments = paid.get(&inv.id).copied().unwrap_or(Decimal::ZERO);
        if payments != received {
            report("received", format!("payments sum to {}, stored {}", payments, received));
        }
        if total - received != outstanding {
            report(
                "outstanding",
                format!("{} - {} != stored {}", total, received, outstanding),
            );
        }
        if received < Decimal::ZERO || received > total {
            report("bounds", format!("received {} outside 0..={}", received, total));
        }
        if status.is_issued() && (status == InvoiceStatus::Paid) != outstanding.is_zero() {
            report(
                "paid_flag",
                format!("status {} with outstanding {}", status, outstanding),
            );
        }
        if (status.is_issued() || status == InvoiceStatus::Void) && inv.sent_at.is_some() {
            check_due_date(inv, &mut report);
        } else if status.is_issued() {
            report("sent_at", format!("status {} without a send time", status));
        }
    }
    Ok(issues)
}

fn check_due_date(inv: &Row, report: &mut impl FnMut(&'static str, String)) {
    let Some(sent_at) = inv.sent_at.as_deref() else {
        return;
    };
    let sent = match stored_instant(sent_at, "sent_at") {
        Ok(s) => s,
        Err(e) => return report("unreadable", e.to_string()),
    };
    let terms = inv
        .billing
        .as_deref()
        .and_then(|raw| serde_json::from_str::<BillingSnapshot>(raw).ok())
        .map(|b| b.payment_terms);
    let Some(terms) = terms else {
        return report("billing_snapshot", "missing or unreadable".to_string());
    };
    let expected = lifecycle::due_date(sent, terms);
    match inv.due_date.as_deref().map(|d| stored_date(d, "due_date")) {
        Some(Ok(due)) if due == expected => {}
        Some(Ok(due)) => report(
            "due_date",
            format!("expected {} (+{} days), stored {}", expected, terms, due),
        ),
        Some(Err(e)) => report("unreadable", e.to_string()),
        None => report("due_date", "missing".to_string()),
    }
}

fn payments_by_invoice(conn: &Connection) -> Result<HashMap<i64, Decimal>> {
    let mut stmt = conn.prepare("SELECT invoice_id, amount FROM payments")?;
    let mut cur = stmt.query([])?;
    let mut out: HashMap<i64, Decimal> = HashMap::new();
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let amount = stored_decimal(&r.get::<_, String>(1)?, "payment amount")?;
        *out.entry(id).or_default() += amount;
    }
    Ok(out)
}
