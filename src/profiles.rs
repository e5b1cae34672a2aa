// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Billing profile store: client billing identity read by invoice creation
//! and send.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::models::BillingProfile;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));
static CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("currency pattern"));

#[derive(Debug, Clone, Default)]
pub struct ProfileInput {
    pub name: String,
    pub primary_emails: Vec<String>,
    pub cc_emails: Vec<String>,
    pub payment_terms: u32,
    pub currency: String,
    pub address: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub primary_emails: Option<Vec<String>>,
    pub cc_emails: Option<Vec<String>>,
    pub payment_terms: Option<u32>,
    pub currency: Option<String>,
    pub address: Option<String>,
}

/// Split a comma/semicolon separated address list.
pub fn split_emails(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn check_emails(list: &[String], field: &str, required: bool) -> LedgerResult<()> {
    if required && list.is_empty() {
        return Err(LedgerError::validation(format!("{} must not be empty", field)));
    }
    if let Some(bad) = list.iter().find(|e| !EMAIL.is_match(e)) {
        return Err(LedgerError::validation(format!(
            "{} contains invalid address '{}'",
            field, bad
        )));
    }
    Ok(())
}

fn check_currency(ccy: &str) -> LedgerResult<()> {
    if !CURRENCY.is_match(ccy) {
        return Err(LedgerError::validation(format!(
            "currency '{}' must be a 3-letter code",
            ccy
        )));
    }
    Ok(())
}

pub fn add_profile(conn: &Connection, input: &ProfileInput) -> LedgerResult<BillingProfile> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("client name must not be empty"));
    }
    check_emails(&input.primary_emails, "billing emails", true)?;
    check_emails(&input.cc_emails, "cc emails", false)?;
    let currency = input.currency.trim().to_uppercase();
    check_currency(&currency)?;

    let exists: Option<i64> = conn
        .query_row("SELECT id FROM clients WHERE name=?1", params![name], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_some() {
        return Err(LedgerError::validation(format!(
            "client '{}' already exists",
            name
        )));
    }

    conn.execute(
        "INSERT INTO clients(name, primary_emails, cc_emails, payment_terms, currency, address)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name,
            serde_json::to_string(&input.primary_emails)?,
            serde_json::to_string(&input.cc_emails)?,
            input.payment_terms,
            currency,
            input.address.trim()
        ],
    )?;
    info!(client = name, terms = input.payment_terms, "billing profile added");
    get_profile(conn, conn.last_insert_rowid())
}

pub fn update_profile(
    conn: &Connection,
    name: &str,
    update: &ProfileUpdate,
) -> LedgerResult<BillingProfile> {
    let mut profile = get_profile_by_name(conn, name)?;
    if let Some(ref emails) = update.primary_emails {
        check_emails(emails, "billing emails", true)?;
        profile.primary_emails = emails.clone();
    }
    if let Some(ref cc) = update.cc_emails {
        check_emails(cc, "cc emails", false)?;
        profile.cc_emails = cc.clone();
    }
    if let Some(terms) = update.payment_terms {
        profile.payment_terms = terms;
    }
    if let Some(ref ccy) = update.currency {
        let ccy = ccy.trim().to_uppercase();
        check_currency(&ccy)?;
        profile.currency = ccy;
    }
    if let Some(ref addr) = update.address {
        profile.address = addr.trim().to_string();
    }

    conn.execute(
        "UPDATE clients SET primary_emails=?1, cc_emails=?2, payment_terms=?3, currency=?4,
             address=?5, updated_at=datetime('now')
         WHERE id=?6",
        params![
            serde_json::to_string(&profile.primary_emails)?,
            serde_json::to_string(&profile.cc_emails)?,
            profile.payment_terms,
            profile.currency,
            profile.address,
            profile.id
        ],
    )?;
    info!(client = %profile.name, "billing profile updated");
    Ok(profile)
}

pub fn set_active(conn: &Connection, name: &str, active: bool) -> LedgerResult<BillingProfile> {
    let id = crate::utils::id_for_client(conn, name)?;
    conn.execute(
        "UPDATE clients SET active=?1, updated_at=datetime('now') WHERE id=?2",
        params![active, id],
    )?;
    info!(client = name, active, "billing profile activation changed");
    get_profile(conn, id)
}

/// Hard delete; refused once any invoice references the profile.
pub fn remove_profile(conn: &Connection, name: &str) -> LedgerResult<()> {
    let id = crate::utils::id_for_client(conn, name)?;
    let refs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM invoices WHERE client_id=?1",
        params![id],
        |r| r.get(0),
    )?;
    if refs > 0 {
        return Err(LedgerError::validation(format!(
            "client '{}' is referenced by {} invoice(s); disable it instead",
            name, refs
        )));
    }
    conn.execute("DELETE FROM clients WHERE id=?1", params![id])?;
    info!(client = name, "billing profile removed");
    Ok(())
}

const COLUMNS: &str =
    "id, name, primary_emails, cc_emails, payment_terms, currency, address, active";

fn from_row(r: &Row<'_>) -> rusqlite::Result<(BillingProfile, String, String)> {
    Ok((
        BillingProfile {
            id: r.get(0)?,
            name: r.get(1)?,
            primary_emails: Vec::new(),
            cc_emails: Vec::new(),
            payment_terms: r.get(4)?,
            currency: r.get(5)?,
            address: r.get(6)?,
            active: r.get(7)?,
        },
        r.get(2)?,
        r.get(3)?,
    ))
}

fn decode(raw: (BillingProfile, String, String)) -> LedgerResult<BillingProfile> {
    let (mut profile, primary, cc) = raw;
    profile.primary_emails = serde_json::from_str(&primary)?;
    profile.cc_emails = serde_json::from_str(&cc)?;
    Ok(profile)
}

pub fn get_profile(conn: &Connection, id: i64) -> LedgerResult<BillingProfile> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM clients WHERE id=?1", COLUMNS),
            params![id],
            from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::NotFound(format!("client #{}", id)))?;
    decode(raw)
}

pub fn get_profile_by_name(conn: &Connection, name: &str) -> LedgerResult<BillingProfile> {
    let id = crate::utils::id_for_client(conn, name)?;
    get_profile(conn, id)
}

pub fn list_profiles(conn: &Connection) -> LedgerResult<Vec<BillingProfile>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM clients ORDER BY name", COLUMNS))?;
    let rows = stmt.query_map([], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}
