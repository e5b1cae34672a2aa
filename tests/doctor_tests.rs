// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use staffledger::commands::doctor::check_ledger;
use staffledger::db;
use staffledger::delivery::{Dispatch, DocumentRenderer, NotificationDispatcher};
use staffledger::invoices::{NewInvoice, create_invoice, send_invoice};
use staffledger::models::{BillingPeriod, Invoice, NewLineItem, NewPayment, PaymentMethod};
use staffledger::payments::record_payment;
use staffledger::profiles::{ProfileInput, add_profile};

struct NullRenderer;

impl DocumentRenderer for NullRenderer {
    fn render(&self, invoice: &Invoice) -> anyhow::Result<String> {
        Ok(invoice.number.clone())
    }
}

struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn dispatch(&self, _message: &Dispatch<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn healthy() -> (Connection, i64) {
    let mut conn = db::open_in_memory().unwrap();
    add_profile(
        &conn,
        &ProfileInput {
            name: "Acme".into(),
            primary_emails: vec!["ap@acme.test".into()],
            payment_terms: 30,
            currency: "USD".into(),
            ..Default::default()
        },
    )
    .unwrap();
    let now = DateTime::parse_from_rfc3339("2025-04-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let inv = create_invoice(
        &mut conn,
        &NewInvoice {
            client: "Acme".into(),
            period: BillingPeriod::month("2025-03").unwrap(),
            line_items: vec![
                NewLineItem::new("Alice", d("80"), d("125")),
                NewLineItem::new("Bob", d("7.5"), d("33.333")),
            ],
            timesheet_refs: vec![],
        },
        now,
    )
    .unwrap();
    send_invoice(&mut conn, inv.id, None, &NullRenderer, &NullDispatcher, now).unwrap();
    record_payment(
        &mut conn,
        inv.id,
        &NewPayment {
            amount: d("5000"),
            received_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            method: PaymentMethod::Check,
            reference: None,
            notes: None,
        },
        now,
    )
    .unwrap();
    (conn, inv.id)
}

#[test]
fn clean_ledger_has_no_issues() {
    let (conn, _) = healthy();
    assert!(check_ledger(&conn).unwrap().is_empty());
}

#[test]
fn tampered_received_is_reported() {
    let (conn, id) = healthy();
    conn.execute(
        "UPDATE invoices SET received='6000' WHERE id=?1",
        params![id],
    )
    .unwrap();
    let checks: Vec<_> = check_ledger(&conn)
        .unwrap()
        .into_iter()
        .map(|i| i.check)
        .collect();
    assert!(checks.contains(&"received"));
    assert!(checks.contains(&"outstanding"));
}

#[test]
fn tampered_line_and_due_date_are_reported() {
    let (conn, id) = healthy();
    conn.execute(
        "UPDATE line_items SET amount='250.01' WHERE invoice_id=?1 AND position=2",
        params![id],
    )
    .unwrap();
    conn.execute(
        "UPDATE invoices SET due_date='2025-06-30' WHERE id=?1",
        params![id],
    )
    .unwrap();
    let issues = check_ledger(&conn).unwrap();
    let checks: Vec<_> = issues.iter().map(|i| i.check).collect();
    assert!(checks.contains(&"line_amount"), "{issues:?}");
    assert!(checks.contains(&"total"));
    assert!(checks.contains(&"due_date"));
    assert!(issues.iter().all(|i| i.invoice == "INV-2025-00001"));
}

#[test]
fn paid_status_without_zero_balance_is_reported() {
    let (conn, id) = healthy();
    conn.execute("UPDATE invoices SET status='paid' WHERE id=?1", params![id])
        .unwrap();
    let checks: Vec<_> = check_ledger(&conn)
        .unwrap()
        .into_iter()
        .map(|i| i.check)
        .collect();
    assert_eq!(checks, vec!["paid_flag"]);
}
