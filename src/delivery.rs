// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Document rendering and notification dispatch. Both run after the ledger
//! has committed a transition; their failures become warnings and leave the
//! invoice's delivery pending.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{DeliveryStatus, Invoice};
use crate::utils::{fmt_money, get_setting, pretty_table};

/// Turns an invoice snapshot into a stored artifact and returns its reference.
pub trait DocumentRenderer {
    fn render(&self, invoice: &Invoice) -> Result<String>;
}

/// Attempts delivery of a rendered invoice to its recipients.
pub trait NotificationDispatcher {
    fn dispatch(&self, message: &Dispatch<'_>) -> Result<()>;
}

#[derive(Debug, Serialize)]
pub struct Dispatch<'a> {
    pub invoice: &'a str,
    pub to: &'a [String],
    pub cc: &'a [String],
    pub artifact: &'a str,
    pub note: Option<&'a str>,
    pub amount_due: String,
    pub due_date: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Render,
    Dispatch,
    /// Writing the delivery outcome back to the ledger.
    Record,
}

impl DeliveryStage {
    fn as_str(&self) -> &'static str {
        match self {
            DeliveryStage::Render => "render",
            DeliveryStage::Dispatch => "dispatch",
            DeliveryStage::Record => "record",
        }
    }
}

/// Non-fatal failure of an external step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryWarning {
    pub stage: DeliveryStage,
    pub message: String,
}

/// Writes a plain-text invoice document per invoice number.
pub struct TextRenderer {
    pub dir: PathBuf,
}

impl TextRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentRenderer for TextRenderer {
    fn render(&self, invoice: &Invoice) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Create document dir {}", self.dir.display()))?;
        let rows: Vec<Vec<String>> = invoice
            .line_items
            .iter()
            .map(|l| {
                vec![
                    l.consultant.clone(),
                    l.hours.to_string(),
                    l.bill_rate.to_string(),
                    format!("{:.2}", l.amount),
                ]
            })
            .collect();
        let mut doc = String::new();
        doc.push_str(&format!("INVOICE {}\n", invoice.number));
        doc.push_str(&format!("Bill to: {}\n", invoice.client_name));
        if let Some(ref billing) = invoice.billing {
            if !billing.address.is_empty() {
                doc.push_str(&format!("         {}\n", billing.address));
            }
        }
        doc.push_str(&format!("Period:  {}\n", invoice.period.label()));
        if let Some(due) = invoice.due_date {
            doc.push_str(&format!("Due:     {}\n", due));
        }
        doc.push('\n');
        doc.push_str(
            &pretty_table(&["Consultant", "Hours", "Rate", "Amount"], rows).to_string(),
        );
        doc.push_str(&format!(
            "\nTotal:       {}\nReceived:    {}\nOutstanding: {}\n",
            fmt_money(&invoice.total, &invoice.currency),
            fmt_money(&invoice.received, &invoice.currency),
            fmt_money(&invoice.outstanding, &invoice.currency)
        ));

        let path = self.dir.join(format!("{}.txt", invoice.number));
        fs::write(&path, doc).with_context(|| format!("Write {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

/// Drops one JSON message per delivery into an outbox directory.
pub struct OutboxDispatcher {
    pub dir: PathBuf,
}

impl OutboxDispatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl NotificationDispatcher for OutboxDispatcher {
    fn dispatch(&self, message: &Dispatch<'_>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Create outbox {}", self.dir.display()))?;
        let stamp = message.at.format("%Y%m%dT%H%M%S%.f");
        let path = self.dir.join(format!("{}-{}.json", message.invoice, stamp));
        fs::write(&path, serde_json::to_string_pretty(message)?)
            .with_context(|| format!("Write {}", path.display()))?;
        Ok(())
    }
}

/// POSTs the delivery as JSON to a webhook.
pub struct WebhookDispatcher {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebhookDispatcher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            client: crate::utils::http_client(timeout)?,
        })
    }
}

impl NotificationDispatcher for WebhookDispatcher {
    fn dispatch(&self, message: &Dispatch<'_>) -> Result<()> {
        self.client
            .post(&self.url)
            .json(message)
            .send()
            .with_context(|| format!("POST {}", self.url))?
            .error_for_status()?;
        Ok(())
    }
}

/// Pick the configured dispatcher (`dispatch` setting: outbox | webhook).
pub fn dispatcher_from_settings(
    conn: &Connection,
    data_dir: &std::path::Path,
) -> Result<Box<dyn NotificationDispatcher>> {
    let mode = get_setting(conn, "dispatch")?.unwrap_or_else(|| "outbox".to_string());
    match mode.as_str() {
        "outbox" => Ok(Box::new(OutboxDispatcher::new(data_dir.join("outbox")))),
        "webhook" => {
            let url = get_setting(conn, "webhook_url")?
                .ok_or_else(|| anyhow!("dispatch=webhook requires the webhook_url setting"))?;
            let secs = get_setting(conn, "dispatch_timeout_secs")?
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(15);
            Ok(Box::new(WebhookDispatcher::new(&url, Duration::from_secs(secs))?))
        }
        other => Err(anyhow!("Unknown dispatch mode '{}' (use outbox|webhook)", other)),
    }
}

fn record_attempt(
    conn: &Connection,
    invoice_id: i64,
    at: DateTime<Utc>,
    stage: DeliveryStage,
    recipients: &[String],
    artifact: Option<&str>,
    failure: Option<&str>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO deliveries(invoice_id, attempted_at, stage, recipients, artifact, outcome, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            invoice_id,
            at.to_rfc3339(),
            stage.as_str(),
            serde_json::to_string(recipients)?,
            artifact,
            if failure.is_some() { "failed" } else { "ok" },
            failure
        ],
    )?;
    Ok(())
}

/// A failed ledger write after the transition committed; reported, not raised.
fn bookkeeping(invoice: &Invoice, result: LedgerResult<()>) -> Option<DeliveryWarning> {
    let e = result.err()?;
    warn!(invoice = %invoice.number, error = %e, "delivery bookkeeping failed; delivery pending");
    Some(DeliveryWarning {
        stage: DeliveryStage::Record,
        message: e.to_string(),
    })
}

/// Render and persist the document reference. The reference is returned
/// whenever rendering worked, even if storing it did not.
pub(crate) fn render_document(
    conn: &Connection,
    invoice: &mut Invoice,
    renderer: &dyn DocumentRenderer,
    now: DateTime<Utc>,
) -> (Option<String>, Option<DeliveryWarning>) {
    match renderer.render(invoice) {
        Ok(reference) => {
            info!(invoice = %invoice.number, document = %reference, "invoice document rendered");
            let stored = conn
                .execute(
                    "UPDATE invoices SET document_ref=?1 WHERE id=?2",
                    params![reference, invoice.id],
                )
                .map_err(LedgerError::from)
                .and_then(|_| {
                    record_attempt(conn, invoice.id, now, DeliveryStage::Render, &[], Some(&reference), None)
                });
            let warning = bookkeeping(invoice, stored);
            if warning.is_none() {
                invoice.attachments.invoice_document = Some(reference.clone());
            }
            (Some(reference), warning)
        }
        Err(e) => {
            let message = format!("{:#}", e);
            warn!(invoice = %invoice.number, error = %message, "invoice rendering failed");
            // a lost log row is traced only; the render warning stands
            let _ = bookkeeping(
                invoice,
                record_attempt(conn, invoice.id, now, DeliveryStage::Render, &[], None, Some(&message)),
            );
            (
                None,
                Some(DeliveryWarning {
                    stage: DeliveryStage::Render,
                    message,
                }),
            )
        }
    }
}

/// Render-if-missing, then dispatch. Sets `delivery_status` to delivered only
/// when dispatch worked and that outcome was stored; it stays pending otherwise.
/// Never touches the invoice's status and never fails.
pub(crate) fn deliver(
    conn: &Connection,
    invoice: &mut Invoice,
    renderer: &dyn DocumentRenderer,
    dispatcher: &dyn NotificationDispatcher,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<DeliveryWarning> {
    let mut warnings = Vec::new();
    let artifact = match invoice.attachments.invoice_document.clone() {
        Some(existing) => Some(existing),
        None => {
            let (reference, warning) = render_document(conn, invoice, renderer, now);
            warnings.extend(warning);
            reference
        }
    };

    let (to, cc) = invoice
        .billing
        .as_ref()
        .map(|b| (b.emails.clone(), b.cc.clone()))
        .unwrap_or_default();

    let mut delivered = false;
    if let Some(ref artifact) = artifact {
        let message = Dispatch {
            invoice: &invoice.number,
            to: &to,
            cc: &cc,
            artifact,
            note,
            amount_due: fmt_money(&invoice.outstanding, &invoice.currency),
            due_date: invoice.due_date.map(|d| d.to_string()),
            at: now,
        };
        match dispatcher.dispatch(&message) {
            Ok(()) => {
                info!(invoice = %invoice.number, recipients = to.len(), "invoice dispatched");
                delivered = true;
                warnings.extend(bookkeeping(
                    invoice,
                    record_attempt(conn, invoice.id, now, DeliveryStage::Dispatch, &to, Some(artifact), None),
                ));
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                warn!(invoice = %invoice.number, error = %detail, "invoice dispatch failed; delivery pending");
                let _ = bookkeeping(
                    invoice,
                    record_attempt(conn, invoice.id, now, DeliveryStage::Dispatch, &to, Some(artifact), Some(&detail)),
                );
                warnings.push(DeliveryWarning {
                    stage: DeliveryStage::Dispatch,
                    message: detail,
                });
            }
        }
    }

    let status = if delivered {
        DeliveryStatus::Delivered
    } else {
        DeliveryStatus::Pending
    };
    let stored = conn
        .execute(
            "UPDATE invoices SET delivery_status=?1 WHERE id=?2",
            params![status.as_str(), invoice.id],
        )
        .map(|_| ())
        .map_err(LedgerError::from);
    match bookkeeping(invoice, stored) {
        Some(w) => {
            warnings.push(w);
            invoice.delivery_status = DeliveryStatus::Pending;
        }
        None => invoice.delivery_status = status,
    }
    warnings
}

/// Attempt log for one invoice, oldest first.
pub fn delivery_log(conn: &Connection, invoice_id: i64) -> LedgerResult<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT attempted_at, stage, recipients, artifact, outcome, detail
         FROM deliveries WHERE invoice_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![invoice_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<String>>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, Option<String>>(5)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (at, stage, recipients, artifact, outcome, detail) = row?;
        let recipients: Vec<String> = serde_json::from_str(&recipients)?;
        out.push(json!({
            "at": at, "stage": stage, "recipients": recipients,
            "artifact": artifact, "outcome": outcome, "detail": detail
        }));
    }
    Ok(out)
}
