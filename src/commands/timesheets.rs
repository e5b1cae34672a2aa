// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

use crate::utils::{arg, get_base_currency, maybe_print_json, opt_arg, parse_date, parse_decimal, pretty_table};
use crate::work::{self, SnapshotInput, SnapshotOutcome};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("import", sub)) => import_timesheets(conn, sub),
        Some(("add", sub)) => add_timesheet(conn, sub),
        Some(("list", sub)) => list_timesheets(conn, sub),
        _ => Ok(()),
    }
}

fn import_timesheets(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = arg(sub, "path")?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let base = get_base_currency(conn)?;

    // All-or-nothing: one bad row leaves the feed untouched.
    let tx = conn.transaction()?;
    let (mut inserted, mut unchanged) = (0usize, 0usize);
    for (idx, result) in rdr.records().enumerate() {
        let rec = result?;
        let line = idx + 2;
        let field = |i: usize, name: &str| -> Result<String> {
            rec.get(i)
                .map(str::to_string)
                .filter(|s| !s.is_empty())
                .with_context(|| format!("line {}: {} missing", line, name))
        };
        let input = SnapshotInput {
            consultant: field(0, "consultant")?,
            client: field(1, "client")?,
            period_start: parse_date(&field(2, "period_start")?)
                .with_context(|| format!("line {}", line))?,
            period_end: parse_date(&field(3, "period_end")?)
                .with_context(|| format!("line {}", line))?,
            hours: parse_decimal(&field(4, "hours")?).with_context(|| format!("line {}", line))?,
            bill_rate: parse_decimal(&field(5, "bill_rate")?)
                .with_context(|| format!("line {}", line))?,
            pay_rate: match rec.get(6).filter(|s| !s.is_empty()) {
                Some(v) => parse_decimal(v).with_context(|| format!("line {}", line))?,
                None => Decimal::ZERO,
            },
            currency: rec
                .get(7)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| base.clone()),
        };
        match work::record_snapshot(&tx, &input).with_context(|| format!("line {}", line))? {
            SnapshotOutcome::Inserted(_) => inserted += 1,
            SnapshotOutcome::Unchanged(_) => unchanged += 1,
        }
    }
    tx.commit()?;
    info!(path, inserted, unchanged, "timesheet feed imported");
    println!(
        "Imported timesheets from {} ({} new, {} already present)",
        path, inserted, unchanged
    );
    Ok(())
}

fn add_timesheet(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let input = SnapshotInput {
        consultant: arg(sub, "consultant")?.to_string(),
        client: arg(sub, "client")?.to_string(),
        period_start: parse_date(arg(sub, "start")?)?,
        period_end: parse_date(arg(sub, "end")?)?,
        hours: parse_decimal(arg(sub, "hours")?)?,
        bill_rate: parse_decimal(arg(sub, "bill-rate")?)?,
        pay_rate: opt_arg(sub, "pay-rate")
            .map(|v| parse_decimal(&v))
            .transpose()?
            .unwrap_or(Decimal::ZERO),
        currency: match opt_arg(sub, "currency") {
            Some(c) => c,
            None => get_base_currency(conn)?,
        },
    };
    match work::record_snapshot(conn, &input)? {
        SnapshotOutcome::Inserted(id) => println!("Recorded timesheet #{}", id),
        SnapshotOutcome::Unchanged(id) => println!("Timesheet #{} already recorded", id),
    }
    Ok(())
}

fn list_timesheets(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let client = opt_arg(sub, "client");
    let snaps = work::list_snapshots(conn, client.as_deref())?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &snaps)? {
        return Ok(());
    }
    let rows = snaps
        .into_iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.consultant,
                s.client,
                format!("{}..{}", s.period_start, s.period_end),
                s.hours.to_string(),
                s.bill_rate.to_string(),
                s.pay_rate.to_string(),
                s.currency,
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Consultant", "Client", "Period", "Hours", "Bill", "Pay", "CCY"],
            rows
        )
    );
    Ok(())
}
