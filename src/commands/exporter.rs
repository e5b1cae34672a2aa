// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde_json::json;

use crate::invoices::{InvoiceFilter, list_invoices};
use crate::payments::list_payments;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("invoices", sub)) => export_invoices(conn, sub),
        Some(("payments", sub)) => export_payments(conn, sub),
        _ => Ok(()),
    }
}

fn format_and_out(sub: &clap::ArgMatches) -> Result<(String, &String)> {
    let fmt = sub
        .get_one::<String>("format")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".into());
    if fmt != "csv" && fmt != "json" {
        return Err(anyhow!("Unknown format: {} (use csv|json)", fmt));
    }
    let out = sub
        .get_one::<String>("out")
        .ok_or_else(|| anyhow!("Missing --out"))?;
    Ok((fmt, out))
}

fn write_rows(fmt: &str, out: &str, header: &[&str], rows: Vec<Vec<String>>) -> Result<()> {
    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(header)?;
            for row in rows {
                wtr.write_record(row)?;
            }
            wtr.flush()?;
        }
        _ => {
            let items: Vec<serde_json::Value> = rows
                .into_iter()
                .map(|row| {
                    let obj: serde_json::Map<String, serde_json::Value> = header
                        .iter()
                        .zip(row)
                        .map(|(k, v)| (k.to_string(), json!(v)))
                        .collect();
                    serde_json::Value::Object(obj)
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
    }
    Ok(())
}

fn export_invoices(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (fmt, out) = format_and_out(sub)?;
    let rows = list_invoices(conn, &InvoiceFilter::default())?
        .into_iter()
        .map(|i| {
            vec![
                i.number,
                i.client_name,
                i.period.start().to_string(),
                i.period.end().to_string(),
                i.status.as_str().to_string(),
                i.currency,
                i.total.to_string(),
                i.received.to_string(),
                i.outstanding.to_string(),
                i.sent_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
                i.due_date.map(|d| d.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    write_rows(
        &fmt,
        out,
        &[
            "number",
            "client",
            "period_start",
            "period_end",
            "status",
            "currency",
            "total",
            "received",
            "outstanding",
            "sent_at",
            "due_date",
        ],
        rows,
    )?;
    println!("Exported invoices to {}", out);
    Ok(())
}

fn export_payments(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (fmt, out) = format_and_out(sub)?;
    let mut rows = Vec::new();
    for inv in list_invoices(conn, &InvoiceFilter::default())? {
        for p in list_payments(conn, inv.id)? {
            rows.push(vec![
                inv.number.clone(),
                p.received_date.to_string(),
                p.amount.to_string(),
                inv.currency.clone(),
                p.method.as_str().to_string(),
                p.reference.unwrap_or_default(),
                p.notes.unwrap_or_default(),
            ]);
        }
    }
    rows.sort_by(|a, b| (&a[1], &a[0]).cmp(&(&b[1], &b[0])));
    write_rows(
        &fmt,
        out,
        &[
            "invoice",
            "received_date",
            "amount",
            "currency",
            "method",
            "reference",
            "notes",
        ],
        rows,
    )?;
    println!("Exported payments to {}", out);
    Ok(())
}
