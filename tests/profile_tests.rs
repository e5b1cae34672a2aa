// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use staffledger::delivery::{Dispatch, DocumentRenderer, NotificationDispatcher};
use staffledger::invoices::{NewInvoice, create_invoice, get_invoice, send_invoice};
use staffledger::models::{BillingPeriod, Invoice, NewLineItem};
use staffledger::profiles::{
    ProfileInput, ProfileUpdate, add_profile, get_profile_by_name, list_profiles, remove_profile,
    set_active, split_emails, update_profile,
};
use staffledger::{LedgerError, db};

fn acme() -> ProfileInput {
    ProfileInput {
        name: "Acme".into(),
        primary_emails: vec!["ap@acme.test".into()],
        cc_emails: vec![],
        payment_terms: 45,
        currency: "usd".into(),
        address: "1 Main St".into(),
    }
}

#[test]
fn add_normalizes_and_rejects_duplicates() {
    let conn = db::open_in_memory().unwrap();
    let p = add_profile(&conn, &acme()).unwrap();
    assert_eq!(p.currency, "USD");
    assert!(p.active);
    assert!(matches!(add_profile(&conn, &acme()), Err(LedgerError::Validation(_))));
    assert_eq!(list_profiles(&conn).unwrap().len(), 1);
}

#[test]
fn add_validates_emails_and_currency() {
    let conn = db::open_in_memory().unwrap();
    let no_email = ProfileInput {
        primary_emails: vec![],
        ..acme()
    };
    assert!(matches!(add_profile(&conn, &no_email), Err(LedgerError::Validation(_))));
    let bad_email = ProfileInput {
        primary_emails: vec!["not-an-address".into()],
        ..acme()
    };
    assert!(add_profile(&conn, &bad_email).is_err());
    let bad_ccy = ProfileInput {
        currency: "dollars".into(),
        ..acme()
    };
    assert!(add_profile(&conn, &bad_ccy).is_err());
}

#[test]
fn split_emails_accepts_commas_and_semicolons() {
    assert_eq!(
        split_emails(" a@x.test; b@x.test ,, c@x.test "),
        vec!["a@x.test", "b@x.test", "c@x.test"]
    );
}

#[test]
fn update_changes_only_given_fields() {
    let conn = db::open_in_memory().unwrap();
    add_profile(&conn, &acme()).unwrap();
    let p = update_profile(
        &conn,
        "Acme",
        &ProfileUpdate {
            payment_terms: Some(15),
            cc_emails: Some(vec!["cfo@acme.test".into()]),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(p.payment_terms, 15);
    assert_eq!(p.cc_emails, vec!["cfo@acme.test".to_string()]);
    assert_eq!(p.primary_emails, vec!["ap@acme.test".to_string()]);
    assert_eq!(get_profile_by_name(&conn, "Acme").unwrap(), p);
}

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

#[test]
fn sent_invoice_keeps_its_billing_snapshot() {
    let mut conn = db::open_in_memory().unwrap();
    add_profile(&conn, &acme()).unwrap();
    let now = DateTime::parse_from_rfc3339("2025-04-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let inv = create_invoice(
        &mut conn,
        &NewInvoice {
            client: "Acme".into(),
            period: BillingPeriod::month("2025-03").unwrap(),
            line_items: vec![NewLineItem::new("Alice", Decimal::from(10), Decimal::from(100))],
            timesheet_refs: vec![],
        },
        now,
    )
    .unwrap();
    send_invoice(&mut conn, inv.id, None, &NullRenderer, &NullDispatcher, now).unwrap();

    update_profile(
        &conn,
        "Acme",
        &ProfileUpdate {
            primary_emails: Some(vec!["new-ap@acme.test".into()]),
            payment_terms: Some(10),
            ..Default::default()
        },
    )
    .unwrap();
    let stored = get_invoice(&conn, inv.id).unwrap();
    let billing = stored.billing.unwrap();
    assert_eq!(billing.emails, vec!["ap@acme.test".to_string()]);
    assert_eq!(billing.payment_terms, 45);
    assert_eq!(stored.due_date.unwrap().to_string(), "2025-05-16");

    // referenced profiles can be disabled but not removed
    assert!(matches!(remove_profile(&conn, "Acme"), Err(LedgerError::Validation(_))));
    assert!(!set_active(&conn, "Acme", false).unwrap().active);
}

#[test]
fn unreferenced_profile_can_be_removed() {
    let conn = db::open_in_memory().unwrap();
    add_profile(&conn, &acme()).unwrap();
    remove_profile(&conn, "Acme").unwrap();
    assert!(matches!(
        get_profile_by_name(&conn, "Acme"),
        Err(LedgerError::NotFound(_))
    ));
}
