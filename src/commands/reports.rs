// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::revenue::{dashboard, month_span, revenue_ledger};
use crate::utils::{arg, get_base_currency, maybe_print_json, opt_arg, parse_date, pretty_table};
use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("revenue", sub)) => revenue(conn, sub)?,
        Some(("dashboard", sub)) => finance_dashboard(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn revenue(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (start, end) = month_span(arg(sub, "from")?, arg(sub, "to")?)?;
    let base = get_base_currency(conn)?;
    let summary = revenue_ledger(conn, start, end, &base)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &summary)? {
        return Ok(());
    }

    let mut data: Vec<Vec<String>> = summary
        .months
        .iter()
        .map(|m| {
            vec![
                m.month.clone(),
                format!("{:.2}", m.revenue),
                format!("{:.2}", m.payout),
                format!("{:.2}", m.margin),
            ]
        })
        .collect();
    data.push(vec![
        "Total".into(),
        format!("{:.2}", summary.revenue),
        format!("{:.2}", summary.payout),
        format!("{:.2} ({}%)", summary.margin, summary.margin_pct),
    ]);
    println!("{}", pretty_table(&["Month", "Revenue", "Payout", "Margin"], data));

    if sub.get_flag("detail") {
        let rows = summary
            .entries
            .iter()
            .map(|e| {
                vec![
                    e.month.clone(),
                    e.consultant.clone(),
                    e.client.clone(),
                    e.hours.to_string(),
                    format!("{:.2}", e.gross_revenue),
                    format!("{:.2}", e.consultant_cost),
                    format!("{:.2}", e.net_profit),
                    format!("{}%", e.margin_pct),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["Month", "Consultant", "Client", "Hours", "Gross", "Cost", "Net", "Margin"],
                rows
            )
        );
    }
    if summary.foreign_invoices_skipped > 0 {
        eprintln!(
            "note: {} invoice(s) not billed in {} were left out",
            summary.foreign_invoices_skipped, base
        );
    }
    Ok(())
}

fn finance_dashboard(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let as_of = match opt_arg(sub, "as-of") {
        Some(d) => parse_date(&d)?,
        None => Utc::now().date_naive(),
    };
    let window = match (opt_arg(sub, "from"), opt_arg(sub, "to")) {
        (Some(f), Some(t)) => Some((parse_date(&f)?, parse_date(&t)?)),
        _ => None,
    };
    let snap = dashboard(conn, as_of, window)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &snap)? {
        return Ok(());
    }
    let data = snap
        .buckets
        .iter()
        .map(|b| {
            vec![
                b.status.to_string(),
                b.count.to_string(),
                format!("{:.2}", b.total),
                format!("{:.2}", b.outstanding),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Status", "Count", "Total", "Outstanding"], data));
    println!("Receivables:      {:.2}", snap.receivables);
    println!("Overdue exposure: {:.2} (as of {})", snap.overdue_exposure, snap.as_of);
    if let Some(received) = snap.received_in_window {
        println!("Received in window: {:.2}", received);
    }
    Ok(())
}
