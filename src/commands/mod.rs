// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod clients;
pub mod timesheets;
pub mod payouts;
pub mod invoices;
pub mod payments;
pub mod reports;
pub mod exporter;
pub mod doctor;
pub mod config;
