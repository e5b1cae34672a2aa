// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Void,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Issued invoices count toward revenue.
    pub fn is_issued(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent
                | InvoiceStatus::PartiallyPaid
                | InvoiceStatus::Paid
                | InvoiceStatus::Overdue
        )
    }

    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for InvoiceStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        InvoiceStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == norm)
            .ok_or_else(|| LedgerError::validation(format!("unknown invoice status '{}'", s)))
    }
}

/// The month or explicit inclusive date range an invoice covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingPeriod {
    Month { start: NaiveDate },
    Range { start: NaiveDate, end: NaiveDate },
}

impl BillingPeriod {
    /// Parse a `YYYY-MM` month.
    pub fn month(s: &str) -> LedgerResult<Self> {
        let start = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|_| LedgerError::validation(format!("invalid month '{}', expected YYYY-MM", s)))?;
        Ok(BillingPeriod::Month { start })
    }

    pub fn range(start: NaiveDate, end: NaiveDate) -> LedgerResult<Self> {
        if end < start {
            return Err(LedgerError::validation(format!(
                "billing range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(BillingPeriod::Range { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        match self {
            BillingPeriod::Month { start } | BillingPeriod::Range { start, .. } => *start,
        }
    }

    pub fn end(&self) -> NaiveDate {
        match self {
            BillingPeriod::Month { start } => last_day_of_month(*start),
            BillingPeriod::Range { end, .. } => *end,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BillingPeriod::Month { .. } => "month",
            BillingPeriod::Range { .. } => "range",
        }
    }

    pub fn label(&self) -> String {
        match self {
            BillingPeriod::Month { start } => start.format("%Y-%m").to_string(),
            BillingPeriod::Range { start, end } => format!("{}..{}", start, end),
        }
    }

    pub fn overlaps(&self, other: &BillingPeriod) -> bool {
        self.start() <= other.end() && other.start() <= self.end()
    }

    /// True when `[start, end]` lies entirely inside this period.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start >= self.start() && end <= self.end()
    }

    pub fn from_stored(kind: &str, start: NaiveDate, end: NaiveDate) -> LedgerResult<Self> {
        match kind {
            "month" => Ok(BillingPeriod::Month { start }),
            "range" => Ok(BillingPeriod::Range { start, end }),
            other => Err(LedgerError::Corrupt(format!("billing period kind '{}'", other))),
        }
    }
}

pub fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    let (y, m) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(d)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingProfile {
    pub id: i64,
    pub name: String,
    pub primary_emails: Vec<String>,
    pub cc_emails: Vec<String>,
    pub payment_terms: u32,
    pub currency: String,
    pub address: String,
    pub active: bool,
}

/// Billable input for one invoice line. The amount is always derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub consultant: String,
    pub hours: Decimal,
    pub bill_rate: Decimal,
}

impl NewLineItem {
    pub fn new(consultant: impl Into<String>, hours: Decimal, bill_rate: Decimal) -> Self {
        Self {
            consultant: consultant.into(),
            hours,
            bill_rate,
        }
    }

    pub fn amount(&self) -> LedgerResult<Decimal> {
        line_amount(self.hours, self.bill_rate)
    }
}

/// hours × rate, rounded half away from zero to cents.
pub fn line_amount(hours: Decimal, rate: Decimal) -> LedgerResult<Decimal> {
    hours
        .checked_mul(rate)
        .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| LedgerError::validation(format!("{} × {} overflows", hours, rate)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub position: u32,
    pub consultant: String,
    pub hours: Decimal,
    pub bill_rate: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachments {
    pub invoice_document: Option<String>,
    pub timesheets: Vec<i64>,
}

/// Billing identity copied onto the invoice when it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    pub emails: Vec<String>,
    pub cc: Vec<String>,
    pub address: String,
    pub payment_terms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    None,
    Pending,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::None => "none",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(DeliveryStatus::None),
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            other => Err(LedgerError::Corrupt(format!("delivery status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub number: String,
    pub client_id: i64,
    pub client_name: String,
    pub currency: String,
    pub period: BillingPeriod,
    pub status: InvoiceStatus,
    pub total: Decimal,
    pub received: Decimal,
    pub outstanding: Decimal,
    pub due_date: Option<NaiveDate>,
    pub sent_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub billing: Option<BillingSnapshot>,
    pub attachments: Attachments,
    pub delivery_status: DeliveryStatus,
    pub line_items: Vec<LineItem>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn balance(&self) -> InvoiceBalance {
        InvoiceBalance {
            invoice_id: self.id,
            number: self.number.clone(),
            total: self.total,
            received: self.received,
            outstanding: self.outstanding,
            status: self.status,
        }
    }
}

/// What callers display after a payment; never computed outside the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceBalance {
    pub invoice_id: i64,
    pub number: String,
    pub total: Decimal,
    pub received: Decimal,
    pub outstanding: Decimal,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "ACH")]
    Ach,
    Wire,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Ach => "ACH",
            PaymentMethod::Wire => "Wire",
            PaymentMethod::Check => "Check",
            PaymentMethod::Other => "Other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ach" => Ok(PaymentMethod::Ach),
            "wire" => Ok(PaymentMethod::Wire),
            "check" | "cheque" => Ok(PaymentMethod::Check),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(LedgerError::validation(format!(
                "unknown payment method '{}' (use ACH|Wire|Check|Other)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    pub received_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub invoice_id: i64,
    pub amount: Decimal,
    pub received_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Approved payroll/timesheet record as captured at approval time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetSnapshot {
    pub id: i64,
    pub consultant: String,
    pub client: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub hours: Decimal,
    pub bill_rate: Decimal,
    pub pay_rate: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processed => "processed",
            PayoutStatus::Failed => "failed",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PayoutStatus::Pending),
            "processed" => Ok(PayoutStatus::Processed),
            "failed" => Ok(PayoutStatus::Failed),
            _ => Err(LedgerError::validation(format!("unknown payout status '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub id: i64,
    pub consultant: String,
    pub client: Option<String>,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub processed_at: Option<NaiveDate>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePeriodEntry {
    pub month: String,
    pub consultant: String,
    pub client: String,
    pub hours: Decimal,
    pub bill_rate: Decimal,
    pub gross_revenue: Decimal,
    pub consultant_cost: Decimal,
    pub net_profit: Decimal,
    pub margin_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEvent {
    pub at: DateTime<Utc>,
    pub from: Option<InvoiceStatus>,
    pub to: InvoiceStatus,
    pub detail: Option<String>,
}
