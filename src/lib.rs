// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cli;
pub mod db;
pub mod delivery;
pub mod error;
pub mod invoices;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod payments;
pub mod payouts;
pub mod profiles;
pub mod revenue;
pub mod utils;
pub mod work;
pub mod commands;

pub use error::{LedgerError, LedgerResult};
