// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use rusqlite::Connection;

use crate::models::PayoutStatus;
use crate::payouts::{self, PayoutInput};
use crate::utils::{arg, maybe_print_json, opt_arg, parse_date, parse_decimal, pretty_table};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("import", sub)) => import_payouts(conn, sub),
        Some(("add", sub)) => {
            let input = PayoutInput {
                consultant: arg(sub, "consultant")?.to_string(),
                client: opt_arg(sub, "client"),
                amount: parse_decimal(arg(sub, "amount")?)?,
                status: arg(sub, "status")?.parse::<PayoutStatus>()?,
                processed_at: opt_arg(sub, "processed-at")
                    .map(|d| parse_date(&d))
                    .transpose()?,
                reference: opt_arg(sub, "reference"),
            };
            let id = payouts::record_payout(conn, &input)?;
            println!("Recorded payout #{}", id);
            Ok(())
        }
        Some(("list", sub)) => {
            let all = payouts::list_payouts(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &all)? {
                return Ok(());
            }
            let rows = all
                .into_iter()
                .map(|p| {
                    vec![
                        p.id.to_string(),
                        p.consultant,
                        p.client.unwrap_or_default(),
                        format!("{:.2}", p.amount),
                        p.status.as_str().to_string(),
                        p.processed_at.map(|d| d.to_string()).unwrap_or_default(),
                        p.reference.unwrap_or_default(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["ID", "Consultant", "Client", "Amount", "Status", "Processed", "Ref"],
                    rows
                )
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

fn import_payouts(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = arg(sub, "path")?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;

    let tx = conn.transaction()?;
    let mut count = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let rec = result?;
        let line = idx + 2;
        let cell = |i: usize| rec.get(i).filter(|s| !s.is_empty()).map(str::to_string);
        let input = PayoutInput {
            consultant: cell(0).with_context(|| format!("line {}: consultant missing", line))?,
            client: cell(1),
            amount: parse_decimal(&cell(2).with_context(|| format!("line {}: amount missing", line))?)
                .with_context(|| format!("line {}", line))?,
            status: cell(3)
                .unwrap_or_else(|| "processed".to_string())
                .parse::<PayoutStatus>()
                .with_context(|| format!("line {}", line))?,
            processed_at: cell(4)
                .map(|d| parse_date(&d))
                .transpose()
                .with_context(|| format!("line {}", line))?,
            reference: cell(5),
        };
        payouts::record_payout(&tx, &input).with_context(|| format!("line {}", line))?;
        count += 1;
    }
    tx.commit()?;
    println!("Imported {} payouts from {}", count, path);
    Ok(())
}
