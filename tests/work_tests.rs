// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use staffledger::invoices::create_from_timesheets;
use staffledger::models::{BillingPeriod, NewLineItem};
use staffledger::profiles::{ProfileInput, add_profile};
use staffledger::work::{
    SnapshotInput, SnapshotOutcome, aggregate_line_items, approved_snapshots, record_snapshot,
};
use staffledger::{LedgerError, db};

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn sheet(consultant: &str, start: &str, end: &str, hours: &str, rate: &str) -> SnapshotInput {
    SnapshotInput {
        consultant: consultant.into(),
        client: "Acme".into(),
        period_start: day(start),
        period_end: day(end),
        hours: d(hours),
        bill_rate: d(rate),
        pay_rate: d("60"),
        currency: "USD".into(),
    }
}

fn setup() -> Connection {
    let conn = db::open_in_memory().unwrap();
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
    conn
}

#[test]
fn aggregates_per_consultant_and_drops_zero_hours() {
    let conn = setup();
    for s in [
        sheet("Bob", "2025-03-01", "2025-03-15", "30", "100"),
        sheet("Alice", "2025-03-01", "2025-03-15", "40", "125"),
        sheet("Alice", "2025-03-16", "2025-03-31", "40", "125"),
        sheet("Bob", "2025-03-16", "2025-03-31", "30", "100"),
        sheet("Carol", "2025-03-01", "2025-03-31", "0", "150"),
        // straddles the month boundary, so it is not part of March
        sheet("Dave", "2025-03-28", "2025-04-03", "20", "90"),
    ] {
        record_snapshot(&conn, &s).unwrap();
    }

    let march = BillingPeriod::month("2025-03").unwrap();
    let snaps = approved_snapshots(&conn, "Acme", &march).unwrap();
    assert_eq!(snaps.len(), 5);

    let lines = aggregate_line_items(&snaps, "USD").unwrap();
    assert_eq!(
        lines,
        vec![
            NewLineItem::new("Alice", d("80"), d("125")),
            NewLineItem::new("Bob", d("60"), d("100")),
        ]
    );
}

#[test]
fn rate_change_mid_period_splits_the_line() {
    let conn = setup();
    record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-15", "40", "120")).unwrap();
    record_snapshot(&conn, &sheet("Alice", "2025-03-16", "2025-03-31", "40", "125")).unwrap();
    let snaps =
        approved_snapshots(&conn, "Acme", &BillingPeriod::month("2025-03").unwrap()).unwrap();
    let lines = aggregate_line_items(&snaps, "USD").unwrap();
    assert_eq!(lines.len(), 2);
    let total: Decimal = lines.iter().map(|l| l.amount().unwrap()).sum();
    assert_eq!(total, d("9800"));
}

#[test]
fn snapshots_are_immutable() {
    let conn = setup();
    let first = record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-31", "80", "125")).unwrap();
    let SnapshotOutcome::Inserted(id) = first else {
        panic!("expected insert, got {first:?}");
    };
    assert_eq!(
        record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-31", "80", "125")).unwrap(),
        SnapshotOutcome::Unchanged(id)
    );
    assert!(matches!(
        record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-31", "80", "150")),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn invoice_from_timesheets_uses_snapshot_rates() {
    let mut conn = setup();
    record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-31", "80", "125")).unwrap();
    record_snapshot(&conn, &sheet("Bob", "2025-03-01", "2025-03-31", "60", "100")).unwrap();
    let SnapshotOutcome::Inserted(idle) =
        record_snapshot(&conn, &sheet("Carol", "2025-03-01", "2025-03-31", "0", "150")).unwrap()
    else {
        panic!("expected a new snapshot");
    };
    let now = DateTime::parse_from_rfc3339("2025-04-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let inv = create_from_timesheets(&mut conn, "Acme", BillingPeriod::month("2025-03").unwrap(), now)
        .unwrap();
    assert_eq!(inv.total, d("16000"));
    assert_eq!(inv.attachments.timesheets.len(), 2);
    assert!(!inv.attachments.timesheets.contains(&idle));
    assert_eq!(inv.line_items.len(), 2);
    assert_eq!(inv.line_items[0].consultant, "Alice");
    assert_eq!(inv.line_items[0].bill_rate, d("125"));

    let empty = create_from_timesheets(&mut conn, "Acme", BillingPeriod::month("2025-05").unwrap(), now);
    assert!(matches!(empty, Err(LedgerError::Validation(_))));
}

#[test]
fn foreign_currency_timesheets_are_rejected() {
    let conn = setup();
    let mut eur = sheet("Alice", "2025-03-01", "2025-03-31", "80", "110");
    eur.currency = "EUR".into();
    record_snapshot(&conn, &eur).unwrap();
    let snaps =
        approved_snapshots(&conn, "Acme", &BillingPeriod::month("2025-03").unwrap()).unwrap();
    assert!(matches!(
        aggregate_line_items(&snaps, "USD"),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn negative_or_reversed_timesheets_are_rejected() {
    let conn = setup();
    assert!(record_snapshot(&conn, &sheet("Alice", "2025-03-31", "2025-03-01", "8", "125")).is_err());
    assert!(record_snapshot(&conn, &sheet("Alice", "2025-03-01", "2025-03-31", "-8", "125")).is_err());
}
