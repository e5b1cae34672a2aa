// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

use crate::delivery::{DeliveryStage, TextRenderer, delivery_log, dispatcher_from_settings};
use crate::invoices::{self, InvoiceFilter, NewInvoice, SendOutcome};
use crate::models::{BillingPeriod, Invoice, InvoiceStatus, NewLineItem};
use crate::utils::{arg, fmt_money, maybe_print_json, opt_arg, parse_date, parse_decimal, pretty_table};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches, data_dir: &Path) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => create(conn, sub),
        Some(("send", sub)) => send(conn, sub, data_dir),
        Some(("void", sub)) => {
            let id = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?.id;
            let inv = invoices::void_invoice(conn, id, arg(sub, "reason")?, Utc::now())?;
            println!("Voided {}", inv.number);
            Ok(())
        }
        Some(("show", sub)) => {
            let inv = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &inv)? {
                print_invoice(&inv);
            }
            Ok(())
        }
        Some(("list", sub)) => list(conn, sub),
        Some(("sweep", sub)) => {
            let today = match opt_arg(sub, "today") {
                Some(d) => parse_date(&d)?,
                None => Utc::now().date_naive(),
            };
            let moved = invoices::sweep_overdue(conn, today, Utc::now())?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &moved)? {
                println!("{} invoice(s) now OVERDUE as of {}", moved.len(), today);
                for b in &moved {
                    println!("  {} outstanding {:.2}", b.number, b.outstanding);
                }
            }
            Ok(())
        }
        Some(("render", sub)) => {
            let id = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?.id;
            let renderer = TextRenderer::new(data_dir.join("documents"));
            let (inv, warning) = invoices::rerender_invoice(conn, id, &renderer, Utc::now())?;
            match warning {
                Some(w) => eprintln!("warning: {} failed: {}", stage_name(&w.stage), w.message),
                None => println!(
                    "Rendered {} -> {}",
                    inv.number,
                    inv.attachments.invoice_document.unwrap_or_default()
                ),
            }
            Ok(())
        }
        Some(("redeliver", sub)) => {
            let id = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?.id;
            let renderer = TextRenderer::new(data_dir.join("documents"));
            let dispatcher = dispatcher_from_settings(conn, data_dir)?;
            let outcome =
                invoices::redeliver_invoice(conn, id, &renderer, dispatcher.as_ref(), Utc::now())?;
            report_delivery(&outcome);
            Ok(())
        }
        Some(("events", sub)) => {
            let inv = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?;
            let events = invoices::invoice_events(conn, inv.id)?;
            let deliveries = delivery_log(conn, inv.id)?;
            let payload = json!({ "invoice": inv.number, "events": &events, "deliveries": &deliveries });
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &payload)? {
                return Ok(());
            }
            let rows = events
                .iter()
                .map(|e| {
                    vec![
                        e.at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        e.from.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                        e.to.to_string(),
                        e.detail.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            println!("{}", pretty_table(&["At", "From", "To", "Detail"], rows));
            for d in &deliveries {
                println!(
                    "  {} {} {} {}",
                    d["at"].as_str().unwrap_or_default(),
                    d["stage"].as_str().unwrap_or_default(),
                    d["outcome"].as_str().unwrap_or_default(),
                    d["detail"].as_str().unwrap_or_default()
                );
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `CONSULTANT:HOURS:RATE`; the consultant part may itself contain colons.
pub fn parse_line(raw: &str) -> Result<NewLineItem> {
    let mut parts = raw.rsplitn(3, ':');
    let rate = parts.next().map(str::trim);
    let hours = parts.next().map(str::trim);
    let consultant = parts.next().map(str::trim);
    match (consultant, hours, rate) {
        (Some(c), Some(h), Some(r)) if !c.is_empty() => Ok(NewLineItem::new(
            c,
            parse_decimal(h).with_context(|| format!("Line item '{}'", raw))?,
            parse_decimal(r).with_context(|| format!("Line item '{}'", raw))?,
        )),
        _ => Err(anyhow!(
            "Invalid line item '{}', expected CONSULTANT:HOURS:RATE",
            raw
        )),
    }
}

fn period_from(sub: &clap::ArgMatches) -> Result<BillingPeriod> {
    if let Some(month) = opt_arg(sub, "month") {
        return Ok(BillingPeriod::month(&month)?);
    }
    match (opt_arg(sub, "from"), opt_arg(sub, "to")) {
        (Some(from), Some(to)) => Ok(BillingPeriod::range(parse_date(&from)?, parse_date(&to)?)?),
        _ => Err(anyhow!("Give a billing period with --month or --from/--to")),
    }
}

fn create(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let client = arg(sub, "client")?;
    let period = period_from(sub)?;
    let inv = if sub.get_flag("from-timesheets") {
        invoices::create_from_timesheets(conn, client, period, Utc::now())?
    } else {
        let line_items = sub
            .get_many::<String>("line")
            .map(|vals| vals.map(|v| parse_line(v)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        let input = NewInvoice {
            client: client.to_string(),
            period,
            line_items,
            timesheet_refs: Vec::new(),
        };
        invoices::create_invoice(conn, &input, Utc::now())?
    };
    println!(
        "Created {} for {} ({}): {}",
        inv.number,
        inv.client_name,
        inv.period.label(),
        fmt_money(&inv.total, &inv.currency)
    );
    Ok(())
}

fn send(conn: &mut Connection, sub: &clap::ArgMatches, data_dir: &Path) -> Result<()> {
    let id = invoices::get_invoice_by_number(conn, arg(sub, "number")?)?.id;
    let note = opt_arg(sub, "note");
    let renderer = TextRenderer::new(data_dir.join("documents"));
    let dispatcher = dispatcher_from_settings(conn, data_dir)?;
    let outcome = invoices::send_invoice(
        conn,
        id,
        note.as_deref(),
        &renderer,
        dispatcher.as_ref(),
        Utc::now(),
    )?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &outcome)? {
        println!(
            "Sent {} (due {})",
            outcome.invoice.number,
            outcome
                .invoice
                .due_date
                .map(|d| d.to_string())
                .unwrap_or_default()
        );
        report_delivery(&outcome);
    }
    Ok(())
}

fn report_delivery(outcome: &SendOutcome) {
    for w in &outcome.warnings {
        eprintln!("warning: {} failed: {}", stage_name(&w.stage), w.message);
    }
    if outcome.delivery_pending() {
        println!(
            "Delivery pending for {}; retry with `invoice redeliver --number {}`",
            outcome.invoice.number, outcome.invoice.number
        );
    } else {
        println!("Delivered {}", outcome.invoice.number);
    }
}

fn stage_name(stage: &DeliveryStage) -> &'static str {
    match stage {
        DeliveryStage::Render => "rendering",
        DeliveryStage::Dispatch => "dispatch",
        DeliveryStage::Record => "recording",
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let filter = InvoiceFilter {
        status: opt_arg(sub, "status")
            .map(|s| s.parse::<InvoiceStatus>())
            .transpose()?,
        client: opt_arg(sub, "client"),
    };
    let all = invoices::list_invoices(conn, &filter)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &all)? {
        return Ok(());
    }
    let rows = all
        .iter()
        .map(|i| {
            vec![
                i.number.clone(),
                i.client_name.clone(),
                i.period.label(),
                i.status.to_string(),
                fmt_money(&i.total, &i.currency),
                fmt_money(&i.outstanding, &i.currency),
                i.due_date.map(|d| d.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Number", "Client", "Period", "Status", "Total", "Outstanding", "Due"],
            rows
        )
    );
    Ok(())
}

fn print_invoice(inv: &Invoice) {
    println!("{}  {}  [{}]", inv.number, inv.client_name, inv.status);
    println!("Period:      {}", inv.period.label());
    if let Some(due) = inv.due_date {
        println!("Due:         {}", due);
    }
    if let Some(ref reason) = inv.void_reason {
        println!("Void reason: {}", reason);
    }
    let rows = inv
        .line_items
        .iter()
        .map(|l| {
            vec![
                l.position.to_string(),
                l.consultant.clone(),
                l.hours.to_string(),
                l.bill_rate.to_string(),
                format!("{:.2}", l.amount),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["#", "Consultant", "Hours", "Rate", "Amount"], rows)
    );
    println!("Total:       {}", fmt_money(&inv.total, &inv.currency));
    println!("Received:    {}", fmt_money(&inv.received, &inv.currency));
    println!("Outstanding: {}", fmt_money(&inv.outstanding, &inv.currency));
    println!("Delivery:    {}", inv.delivery_status.as_str());
}
