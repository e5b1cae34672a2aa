// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, anyhow};
use regex::Regex;
use rusqlite::Connection;

use crate::utils::{arg, get_setting, maybe_print_json, pretty_table, set_setting};

/// Known settings and their defaults.
pub const SETTINGS: [(&str, &str); 5] = [
    ("base_currency", "USD"),
    ("busy_timeout_ms", "5000"),
    ("dispatch", "outbox"),
    ("dispatch_timeout_secs", "15"),
    ("webhook_url", ""),
];

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("get", sub)) => {
            let key = known(arg(sub, "key")?)?;
            let value = effective(conn, key)?;
            println!("{}", value);
        }
        Some(("set", sub)) => {
            let key = known(arg(sub, "key")?)?;
            let value = arg(sub, "value")?;
            validate(key, value)?;
            let value = if key == "base_currency" {
                value.to_uppercase()
            } else {
                value.to_string()
            };
            set_setting(conn, key, &value)?;
            println!("{} = {}", key, value);
        }
        Some(("list", sub)) => {
            let mut rows = Vec::new();
            for (key, _) in SETTINGS {
                rows.push(vec![key.to_string(), effective(conn, key)?]);
            }
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
                println!("{}", pretty_table(&["Key", "Value"], rows));
            }
        }
        _ => {}
    }
    Ok(())
}

fn known(key: &str) -> Result<&'static str> {
    SETTINGS
        .iter()
        .map(|(k, _)| *k)
        .find(|k| *k == key)
        .ok_or_else(|| anyhow!("Unknown setting '{}'", key))
}

fn effective(conn: &Connection, key: &str) -> Result<String> {
    let default = SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .unwrap_or_default();
    Ok(get_setting(conn, key)?.unwrap_or(default))
}

pub fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        "base_currency" => {
            let re = Regex::new(r"^[A-Za-z]{3}$")?;
            if !re.is_match(value) {
                return Err(anyhow!("base_currency must be a 3-letter code"));
            }
        }
        "busy_timeout_ms" | "dispatch_timeout_secs" => {
            value
                .parse::<u64>()
                .map_err(|_| anyhow!("{} must be a whole number", key))?;
        }
        "dispatch" => {
            if value != "outbox" && value != "webhook" {
                return Err(anyhow!("dispatch must be outbox or webhook"));
            }
        }
        "webhook_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(anyhow!("webhook_url must be an http(s) URL"));
            }
        }
        _ => {}
    }
    Ok(())
}
