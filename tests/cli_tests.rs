// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use rusqlite::Connection;
use rust_decimal::Decimal;
use staffledger::commands::{self, invoices::parse_line};
use staffledger::invoices::get_invoice_by_number;
use staffledger::models::{DeliveryStatus, InvoiceStatus};
use staffledger::utils::get_setting;
use staffledger::{cli, db};
use tempfile::{NamedTempFile, tempdir};

fn run(conn: &mut Connection, data_dir: &Path, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["staffledger"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("client", sub)) => commands::clients::handle(conn, sub),
        Some(("timesheet", sub)) => commands::timesheets::handle(conn, sub),
        Some(("payout", sub)) => commands::payouts::handle(conn, sub),
        Some(("invoice", sub)) => commands::invoices::handle(conn, sub, data_dir),
        Some(("payment", sub)) => commands::payments::handle(conn, sub),
        Some(("report", sub)) => commands::reports::handle(conn, sub),
        Some(("export", sub)) => commands::exporter::handle(conn, sub),
        Some(("doctor", sub)) => commands::doctor::handle(conn, sub),
        Some(("config", sub)) => commands::config::handle(conn, sub),
        other => panic!("unexpected subcommand {other:?}"),
    }
}

fn only_number(conn: &Connection) -> String {
    conn.query_row("SELECT number FROM invoices", [], |r| r.get(0))
        .unwrap()
}

fn with_client() -> Connection {
    let mut conn = db::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    run(
        &mut conn,
        dir.path(),
        &[
            "client", "add", "--name", "Acme", "--email", "ap@acme.test; ops@acme.test",
            "--terms", "30", "--currency", "usd",
        ],
    )
    .unwrap();
    conn
}

#[test]
fn create_send_and_pay_through_the_cli() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    run(
        &mut conn,
        dir.path(),
        &[
            "invoice", "create", "--client", "Acme", "--month", "2025-03",
            "--line", "Alice:80:125", "--line", "Bob:60:100",
        ],
    )
    .unwrap();
    let number = only_number(&conn);

    run(&mut conn, dir.path(), &["invoice", "send", "--number", &number, "--note", "Thanks"]).unwrap();
    let inv = get_invoice_by_number(&conn, &number).unwrap();
    assert_eq!(inv.status, InvoiceStatus::Sent);
    assert_eq!(inv.total, Decimal::from(16000));
    assert_eq!(inv.delivery_status, DeliveryStatus::Delivered);
    assert!(dir.path().join("documents").join(format!("{}.txt", number)).exists());
    let outbox: Vec<_> = std::fs::read_dir(dir.path().join("outbox")).unwrap().collect();
    assert_eq!(outbox.len(), 1);

    run(
        &mut conn,
        dir.path(),
        &[
            "payment", "record", "--invoice", &number, "--amount", "16000", "--date",
            "2025-04-20", "--method", "wire",
        ],
    )
    .unwrap();
    assert_eq!(
        get_invoice_by_number(&conn, &number).unwrap().status,
        InvoiceStatus::Paid
    );

    run(&mut conn, dir.path(), &["doctor", "--json"]).unwrap();
}

#[test]
fn cli_errors_surface_ledger_failures() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    run(
        &mut conn,
        dir.path(),
        &["invoice", "create", "--client", "Acme", "--month", "2025-03", "--line", "Alice:1:100"],
    )
    .unwrap();
    let number = only_number(&conn);
    let err = run(
        &mut conn,
        dir.path(),
        &["invoice", "create", "--client", "Acme", "--from", "2025-03-10", "--to", "2025-03-20", "--line", "Bob:1:100"],
    )
    .unwrap_err();
    assert!(err.to_string().contains("already bills"), "{err:#}");

    let err = run(
        &mut conn,
        dir.path(),
        &[
            "payment", "record", "--invoice", &number, "--amount", "10", "--date",
            "2025-04-01", "--method", "ACH",
        ],
    )
    .unwrap_err();
    assert!(err.to_string().contains("DRAFT"), "{err:#}");
}

#[test]
fn month_and_range_conflict() {
    let res = cli::build_cli().try_get_matches_from([
        "staffledger", "invoice", "create", "--client", "Acme", "--month", "2025-03", "--from",
        "2025-03-01", "--to", "2025-03-31",
    ]);
    assert!(res.is_err());
}

#[test]
fn timesheet_import_feeds_invoice_creation() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "consultant,client,period_start,period_end,hours,bill_rate,pay_rate,currency\n\
         Alice,Acme,2025-03-01,2025-03-31,80,125,70,USD\n\
         Bob,Acme,2025-03-01,2025-03-31,60,100,55,\n\
         Carol,Acme,2025-03-01,2025-03-31,0,150,90,USD"
    )
    .unwrap();
    file.flush().unwrap();
    let path = format!("  {}  ", file.path().display());

    run(&mut conn, dir.path(), &["timesheet", "import", "--path", &path]).unwrap();
    // importing the same feed twice is harmless
    run(&mut conn, dir.path(), &["timesheet", "import", "--path", &path]).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM timesheets", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 3);

    run(
        &mut conn,
        dir.path(),
        &["invoice", "create", "--client", "Acme", "--month", "2025-03", "--from-timesheets"],
    )
    .unwrap();
    let inv = get_invoice_by_number(&conn, &only_number(&conn)).unwrap();
    assert_eq!(inv.line_items.len(), 2);
    assert_eq!(inv.total, Decimal::from(16000));
}

#[test]
fn bad_timesheet_row_rolls_back_the_import() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "consultant,client,period_start,period_end,hours,bill_rate,pay_rate,currency\n\
         Alice,Acme,2025-03-01,2025-03-31,80,125,70,USD\n\
         Bob,Acme,2025-03-31,2025-03-01,60,100,55,USD"
    )
    .unwrap();
    file.flush().unwrap();
    let path = file.path().to_string_lossy().to_string();
    assert!(run(&mut conn, dir.path(), &["timesheet", "import", "--path", &path]).is_err());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM timesheets", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn export_invoices_as_json() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    run(
        &mut conn,
        dir.path(),
        &["invoice", "create", "--client", "Acme", "--month", "2025-03", "--line", "Alice:8:125.50"],
    )
    .unwrap();
    let out = dir.path().join("invoices.json");
    let out_str = out.to_string_lossy().to_string();
    run(&mut conn, dir.path(), &["export", "invoices", "--format", "json", "--out", &out_str]).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let rows = parsed.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["client"], "Acme");
    assert_eq!(rows[0]["status"], "draft");
    assert_eq!(rows[0]["period_start"], "2025-03-01");
    assert_eq!(rows[0]["period_end"], "2025-03-31");
    assert_eq!(rows[0]["total"], "1004.00");
}

#[test]
fn export_rejects_unknown_format() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    let out = dir.path().join("payments.xml");
    let out_str = out.to_string_lossy().to_string();
    assert!(run(&mut conn, dir.path(), &["export", "payments", "--format", "xml", "--out", &out_str]).is_err());
    assert!(!out.exists());
}

#[test]
fn payouts_feed_the_revenue_report() {
    let mut conn = with_client();
    let dir = tempdir().unwrap();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "consultant,client,amount,status,processed_at,reference\n\
         Alice,Acme,5600,processed,2025-03-31,PR-1\n\
         Bob,,3300,pending,,"
    )
    .unwrap();
    file.flush().unwrap();
    let path = file.path().to_string_lossy().to_string();
    run(&mut conn, dir.path(), &["payout", "import", "--path", &path]).unwrap();
    run(
        &mut conn,
        dir.path(),
        &[
            "payout", "add", "--consultant", "Bob", "--amount", "3300", "--processed-at",
            "2025-03-31",
        ],
    )
    .unwrap();
    let processed: i64 = conn
        .query_row("SELECT COUNT(*) FROM payouts WHERE status='processed'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(processed, 2);
    run(&mut conn, dir.path(), &["report", "revenue", "--from", "2025-01", "--to", "2025-03", "--json"]).unwrap();
    run(&mut conn, dir.path(), &["report", "dashboard", "--as-of", "2025-04-01"]).unwrap();
}

#[test]
fn config_set_validates_known_keys() {
    let mut conn = db::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    run(&mut conn, dir.path(), &["config", "set", "--key", "base_currency", "--value", "eur"]).unwrap();
    assert_eq!(get_setting(&conn, "base_currency").unwrap().as_deref(), Some("EUR"));
    assert!(run(&mut conn, dir.path(), &["config", "set", "--key", "dispatch", "--value", "fax"]).is_err());
    assert!(run(&mut conn, dir.path(), &["config", "set", "--key", "colour", "--value", "red"]).is_err());
}

#[test]
fn line_items_parse_from_the_command_line() {
    let line = parse_line("Dana: Smith:7.5:140").unwrap();
    assert_eq!(line.consultant, "Dana: Smith");
    assert_eq!(line.hours, "7.5".parse::<Decimal>().unwrap());
    assert_eq!(line.bill_rate, Decimal::from(140));
    assert!(parse_line("Alice:80").is_err());
    assert!(parse_line(":80:125").is_err());
    assert!(parse_line("Alice:eighty:125").is_err());
}
