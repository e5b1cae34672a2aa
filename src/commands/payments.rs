// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::warn;

use crate::invoices::get_invoice_by_number;
use crate::models::{NewPayment, PaymentMethod};
use crate::payments::{self, PaymentReceipt, is_settled};
use crate::utils::{arg, fmt_money, maybe_print_json, opt_arg, parse_date, parse_decimal, pretty_table};

const RECORD_ATTEMPTS: usize = 3;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("record", sub)) => record(conn, sub),
        Some(("list", sub)) => list(conn, sub),
        _ => Ok(()),
    }
}

fn record(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let invoice = get_invoice_by_number(conn, arg(sub, "invoice")?)?;
    let input = NewPayment {
        amount: parse_decimal(arg(sub, "amount")?)?,
        received_date: parse_date(arg(sub, "date")?)?,
        method: arg(sub, "method")?.parse::<PaymentMethod>()?,
        reference: opt_arg(sub, "reference"),
        notes: opt_arg(sub, "notes"),
    };
    let receipt = record_with_retry(conn, invoice.id, &input)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &receipt)? {
        return Ok(());
    }
    let b = &receipt.invoice;
    println!(
        "Recorded {} on {}: received {}, outstanding {}, status {}",
        fmt_money(&receipt.payment.amount, &invoice.currency),
        b.number,
        fmt_money(&b.received, &invoice.currency),
        fmt_money(&b.outstanding, &invoice.currency),
        b.status
    );
    if is_settled(b) {
        println!("{} is fully paid", b.number);
    }
    Ok(())
}

/// Conflicts are retried against fresh state; every other error is final.
fn record_with_retry(
    conn: &mut Connection,
    invoice_id: i64,
    input: &NewPayment,
) -> Result<PaymentReceipt> {
    let mut attempt = 1;
    loop {
        match payments::record_payment(conn, invoice_id, input, Utc::now()) {
            Err(e) if e.is_retryable() && attempt < RECORD_ATTEMPTS => {
                warn!(attempt, error = %e, "payment conflicted; retrying");
                attempt += 1;
            }
            other => return Ok(other?),
        }
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let invoice = get_invoice_by_number(conn, arg(sub, "invoice")?)?;
    let all = payments::list_payments(conn, invoice.id)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &all)? {
        return Ok(());
    }
    let rows = all
        .iter()
        .map(|p| {
            vec![
                p.received_date.to_string(),
                fmt_money(&p.amount, &invoice.currency),
                p.method.to_string(),
                p.reference.clone().unwrap_or_default(),
                p.notes.clone().unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Received", "Amount", "Method", "Reference", "Notes"], rows)
    );
    println!(
        "Received {} of {}, outstanding {}",
        fmt_money(&invoice.received, &invoice.currency),
        fmt_money(&invoice.total, &invoice.currency),
        fmt_money(&invoice.outstanding, &invoice.currency)
    );
    Ok(())
}
