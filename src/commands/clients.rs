// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::models::BillingProfile;
use crate::profiles::{self, ProfileInput, ProfileUpdate, split_emails};
use crate::utils::{arg, get_base_currency, maybe_print_json, opt_arg, pretty_table};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let currency = match opt_arg(sub, "currency") {
                Some(c) => c.to_uppercase(),
                None => get_base_currency(conn)?,
            };
            let input = ProfileInput {
                name: arg(sub, "name")?.to_string(),
                primary_emails: split_emails(arg(sub, "email")?),
                cc_emails: opt_arg(sub, "cc").map(|s| split_emails(&s)).unwrap_or_default(),
                payment_terms: *sub.get_one::<u32>("terms").unwrap_or(&30),
                currency,
                address: opt_arg(sub, "address").unwrap_or_default(),
            };
            let p = profiles::add_profile(conn, &input)?;
            println!("Added client '{}' (net {} days, {})", p.name, p.payment_terms, p.currency);
        }
        Some(("update", sub)) => {
            let update = ProfileUpdate {
                primary_emails: opt_arg(sub, "email").map(|s| split_emails(&s)),
                cc_emails: opt_arg(sub, "cc").map(|s| split_emails(&s)),
                payment_terms: sub.get_one::<u32>("terms").copied(),
                currency: opt_arg(sub, "currency").map(|c| c.to_uppercase()),
                address: opt_arg(sub, "address"),
            };
            let p = profiles::update_profile(conn, arg(sub, "name")?, &update)?;
            println!("Updated client '{}'", p.name);
        }
        Some(("disable", sub)) => {
            let p = profiles::set_active(conn, arg(sub, "name")?, false)?;
            println!("Disabled client '{}'", p.name);
        }
        Some(("enable", sub)) => {
            let p = profiles::set_active(conn, arg(sub, "name")?, true)?;
            println!("Enabled client '{}'", p.name);
        }
        Some(("remove", sub)) => {
            let name = arg(sub, "name")?;
            profiles::remove_profile(conn, name)?;
            println!("Removed client '{}'", name);
        }
        Some(("show", sub)) => {
            let p = profiles::get_profile_by_name(conn, arg(sub, "name")?)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &p)? {
                println!("{}", table(vec![p]));
            }
        }
        Some(("list", sub)) => {
            let all = profiles::list_profiles(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &all)? {
                println!("{}", table(all));
            }
        }
        _ => {}
    }
    Ok(())
}

fn table(profiles: Vec<BillingProfile>) -> comfy_table::Table {
    let rows = profiles
        .into_iter()
        .map(|p| {
            vec![
                p.name,
                p.primary_emails.join(", "),
                p.cc_emails.join(", "),
                format!("net {}", p.payment_terms),
                p.currency,
                if p.active { "active" } else { "disabled" }.to_string(),
            ]
        })
        .collect();
    pretty_table(&["Client", "Billing emails", "CC", "Terms", "CCY", "State"], rows)
}
