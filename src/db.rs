// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::LedgerResult;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Staffledger", "staffledger"));

pub const DB_ENV: &str = "STAFFLEDGER_DB";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        let path = PathBuf::from(p);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(parent.to_path_buf());
        }
        return Ok(PathBuf::from("."));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.to_path_buf())
}

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        return Ok(PathBuf::from(p));
    }
    Ok(data_dir()?.join("staffledger.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    open_path(&path)
}

pub fn open_path(path: &std::path::Path) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&conn)?;
    apply_busy_timeout(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Open in-memory DB")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Writers wait this long for the database lock before reporting a conflict.
fn apply_busy_timeout(conn: &Connection) -> Result<()> {
    let ms = crate::utils::get_setting(conn, "busy_timeout_ms")?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
    conn.busy_timeout(Duration::from_millis(ms))?;
    Ok(())
}

/// Start a transaction that holds the write lock from its first statement, so
/// read-validate-write sequences cannot interleave with another writer.
pub fn begin_write(conn: &mut Connection) -> LedgerResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sequences(
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS clients(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        primary_emails TEXT NOT NULL, -- JSON array
        cc_emails TEXT NOT NULL DEFAULT '[]',
        payment_terms INTEGER NOT NULL CHECK(payment_terms >= 0),
        currency TEXT NOT NULL,
        address TEXT NOT NULL DEFAULT '',
        active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Approved payroll/timesheet feed; read-only to the ledger
    CREATE TABLE IF NOT EXISTS timesheets(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        consultant TEXT NOT NULL,
        client TEXT NOT NULL,
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        hours TEXT NOT NULL,
        bill_rate TEXT NOT NULL,
        pay_rate TEXT NOT NULL DEFAULT '0',
        currency TEXT NOT NULL,
        approved_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(consultant, client, period_start, period_end)
    );
    CREATE INDEX IF NOT EXISTS idx_timesheets_client ON timesheets(client, period_start);

    CREATE TABLE IF NOT EXISTS payouts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        consultant TEXT NOT NULL,
        client TEXT,
        amount TEXT NOT NULL,
        status TEXT NOT NULL CHECK(status IN ('pending','processed','failed')),
        processed_at TEXT,
        reference TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_payouts_processed ON payouts(processed_at);

    CREATE TABLE IF NOT EXISTS invoices(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        number TEXT NOT NULL UNIQUE,
        client_id INTEGER NOT NULL,
        currency TEXT NOT NULL,
        period_kind TEXT NOT NULL CHECK(period_kind IN ('month','range')),
        period_start TEXT NOT NULL,
        period_end TEXT NOT NULL,
        status TEXT NOT NULL,
        total TEXT NOT NULL,
        received TEXT NOT NULL DEFAULT '0',
        outstanding TEXT NOT NULL,
        due_date TEXT,
        sent_at TEXT,
        voided_at TEXT,
        void_reason TEXT,
        billing_snapshot TEXT, -- JSON, written once at send
        send_note TEXT,
        document_ref TEXT,
        timesheet_refs TEXT NOT NULL DEFAULT '[]',
        delivery_status TEXT NOT NULL DEFAULT 'none',
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY(client_id) REFERENCES clients(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_invoices_client ON invoices(client_id, period_start);
    CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
    CREATE INDEX IF NOT EXISTS idx_invoices_period ON invoices(period_start);

    CREATE TABLE IF NOT EXISTS line_items(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        consultant TEXT NOT NULL,
        hours TEXT NOT NULL,
        bill_rate TEXT NOT NULL,
        amount TEXT NOT NULL,
        UNIQUE(invoice_id, position),
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        received_date TEXT NOT NULL,
        method TEXT NOT NULL CHECK(method IN ('ACH','Wire','Check','Other')),
        reference TEXT,
        notes TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments(invoice_id, received_date);

    CREATE TABLE IF NOT EXISTS invoice_events(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        from_status TEXT,
        to_status TEXT NOT NULL,
        at TEXT NOT NULL,
        detail TEXT,
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS deliveries(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        invoice_id INTEGER NOT NULL,
        attempted_at TEXT NOT NULL,
        stage TEXT NOT NULL CHECK(stage IN ('render','dispatch')),
        recipients TEXT NOT NULL DEFAULT '[]',
        artifact TEXT,
        outcome TEXT NOT NULL CHECK(outcome IN ('ok','failed')),
        detail TEXT,
        FOREIGN KEY(invoice_id) REFERENCES invoices(id) ON DELETE RESTRICT
    );
    "#,
    )?;
    Ok(())
}
