// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print as JSON lines"),
    )
}

fn req(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).required(true).help(help)
}

fn opt(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help)
}

fn number_arg() -> Arg {
    req("number", "Invoice number, e.g. INV-2025-00001")
}

fn client_cmd() -> Command {
    Command::new("client")
        .about("Manage client billing profiles")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Add a billing profile")
                .arg(req("name", "Client name"))
                .arg(req("email", "Primary billing emails, comma separated"))
                .arg(opt("cc", "CC emails, comma separated"))
                .arg(
                    Arg::new("terms")
                        .long("terms")
                        .value_parser(value_parser!(u32))
                        .default_value("30")
                        .help("Payment terms in days"),
                )
                .arg(opt("currency", "Billing currency (default: base currency)"))
                .arg(opt("address", "Billing address")),
        )
        .subcommand(
            Command::new("update")
                .about("Change a billing profile")
                .arg(req("name", "Client name"))
                .arg(opt("email", "Primary billing emails, comma separated"))
                .arg(opt("cc", "CC emails, comma separated"))
                .arg(
                    Arg::new("terms")
                        .long("terms")
                        .value_parser(value_parser!(u32))
                        .help("Payment terms in days"),
                )
                .arg(opt("currency", "Billing currency"))
                .arg(opt("address", "Billing address")),
        )
        .subcommand(Command::new("disable").arg(req("name", "Client name")))
        .subcommand(Command::new("enable").arg(req("name", "Client name")))
        .subcommand(
            Command::new("remove")
                .about("Delete a profile that no invoice references")
                .arg(req("name", "Client name")),
        )
        .subcommand(json_flags(Command::new("show").arg(req("name", "Client name"))))
        .subcommand(json_flags(Command::new("list")))
}

fn timesheet_cmd() -> Command {
    Command::new("timesheet")
        .about("Load the approved timesheet feed")
        .subcommand_required(true)
        .subcommand(
            Command::new("import")
                .about("Import approved timesheets from CSV")
                .arg(req(
                    "path",
                    "CSV with consultant,client,period_start,period_end,hours,bill_rate,pay_rate,currency",
                )),
        )
        .subcommand(
            Command::new("add")
                .about("Record one approved timesheet")
                .arg(req("consultant", "Consultant name"))
                .arg(req("client", "Client name"))
                .arg(req("start", "Period start YYYY-MM-DD"))
                .arg(req("end", "Period end YYYY-MM-DD"))
                .arg(req("hours", "Approved hours"))
                .arg(req("bill-rate", "Bill rate per hour"))
                .arg(opt("pay-rate", "Pay rate per hour"))
                .arg(opt("currency", "Currency (default: base currency)")),
        )
        .subcommand(json_flags(
            Command::new("list").arg(opt("client", "Only this client")),
        ))
}

fn payout_cmd() -> Command {
    Command::new("payout")
        .about("Load the consultant payout feed")
        .subcommand_required(true)
        .subcommand(
            Command::new("import")
                .about("Import payouts from CSV")
                .arg(req(
                    "path",
                    "CSV with consultant,client,amount,status,processed_at,reference",
                )),
        )
        .subcommand(
            Command::new("add")
                .about("Record one payout")
                .arg(req("consultant", "Consultant name"))
                .arg(opt("client", "Client the payout relates to"))
                .arg(req("amount", "Amount paid out"))
                .arg(
                    Arg::new("status")
                        .long("status")
                        .default_value("processed")
                        .help("pending|processed|failed"),
                )
                .arg(opt("processed-at", "Processed date YYYY-MM-DD"))
                .arg(opt("reference", "Payroll reference")),
        )
        .subcommand(json_flags(Command::new("list")))
}

fn invoice_cmd() -> Command {
    Command::new("invoice")
        .about("Create, send and void invoices")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Create a DRAFT invoice")
                .arg(req("client", "Client name"))
                .arg(opt("month", "Billing month YYYY-MM").conflicts_with_all(["from", "to"]))
                .arg(opt("from", "Range start YYYY-MM-DD").requires("to"))
                .arg(opt("to", "Range end YYYY-MM-DD").requires("from"))
                .arg(
                    Arg::new("line")
                        .long("line")
                        .action(ArgAction::Append)
                        .help("Line item as CONSULTANT:HOURS:RATE (repeatable)"),
                )
                .arg(
                    Arg::new("from-timesheets")
                        .long("from-timesheets")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("line")
                        .help("Build lines from approved timesheets"),
                ),
        )
        .subcommand(
            json_flags(Command::new("send"))
                .about("Send a DRAFT invoice")
                .arg(number_arg())
                .arg(opt("note", "Note for the recipients")),
        )
        .subcommand(
            Command::new("void")
                .about("Void an unpaid invoice")
                .arg(number_arg())
                .arg(req("reason", "Why the invoice is voided")),
        )
        .subcommand(json_flags(Command::new("show").arg(number_arg())))
        .subcommand(json_flags(
            Command::new("list")
                .arg(opt("status", "Filter by status"))
                .arg(opt("client", "Filter by client")),
        ))
        .subcommand(json_flags(
            Command::new("sweep")
                .about("Mark past-due invoices OVERDUE")
                .arg(opt("today", "Evaluation date YYYY-MM-DD (default: today)")),
        ))
        .subcommand(
            Command::new("render")
                .about("Regenerate the invoice document")
                .arg(number_arg()),
        )
        .subcommand(
            Command::new("redeliver")
                .about("Retry a pending delivery")
                .arg(number_arg()),
        )
        .subcommand(json_flags(
            Command::new("events")
                .about("Status history and delivery attempts")
                .arg(number_arg()),
        ))
}

fn payment_cmd() -> Command {
    Command::new("payment")
        .about("Record and list client payments")
        .subcommand_required(true)
        .subcommand(json_flags(
            Command::new("record")
                .arg(req("invoice", "Invoice number"))
                .arg(req("amount", "Amount received"))
                .arg(req("date", "Received date YYYY-MM-DD"))
                .arg(req("method", "ACH|Wire|Check|Other"))
                .arg(opt("reference", "Bank or check reference"))
                .arg(opt("notes", "Free-form notes")),
        ))
        .subcommand(json_flags(
            Command::new("list").arg(req("invoice", "Invoice number")),
        ))
}

fn report_cmd() -> Command {
    Command::new("report")
        .about("Revenue and receivables reports")
        .subcommand_required(true)
        .subcommand(json_flags(
            Command::new("revenue")
                .about("Revenue, payouts and margin over a month range")
                .arg(req("from", "First month YYYY-MM"))
                .arg(req("to", "Last month YYYY-MM"))
                .arg(
                    Arg::new("detail")
                        .long("detail")
                        .action(ArgAction::SetTrue)
                        .help("Show per consultant/client rows"),
                ),
        ))
        .subcommand(json_flags(
            Command::new("dashboard")
                .about("Receivables snapshot")
                .arg(opt("as-of", "Snapshot date YYYY-MM-DD (default: today)"))
                .arg(opt("from", "Received window start YYYY-MM-DD").requires("to"))
                .arg(opt("to", "Received window end YYYY-MM-DD").requires("from")),
        ))
}

fn export_cmd() -> Command {
    let target = |name: &'static str| {
        Command::new(name)
            .arg(
                Arg::new("format")
                    .long("format")
                    .default_value("csv")
                    .help("csv|json"),
            )
            .arg(req("out", "Output path"))
    };
    Command::new("export")
        .about("Export ledger data")
        .subcommand_required(true)
        .subcommand(target("invoices"))
        .subcommand(target("payments"))
}

fn config_cmd() -> Command {
    Command::new("config")
        .about("Runtime settings")
        .subcommand_required(true)
        .subcommand(Command::new("get").arg(req("key", "Setting name")))
        .subcommand(
            Command::new("set")
                .arg(req("key", "Setting name"))
                .arg(req("value", "Setting value")),
        )
        .subcommand(json_flags(Command::new("list")))
}

pub fn build_cli() -> Command {
    Command::new("staffledger")
        .version(crate_version!())
        .about("Invoice lifecycle and payment reconciliation for staffing agencies")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log progress to stderr"),
        )
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(client_cmd())
        .subcommand(timesheet_cmd())
        .subcommand(payout_cmd())
        .subcommand(invoice_cmd())
        .subcommand(payment_cmd())
        .subcommand(report_cmd())
        .subcommand(export_cmd())
        .subcommand(json_flags(
            Command::new("doctor").about("Check stored balances and totals"),
        ))
        .subcommand(config_cmd())
}
