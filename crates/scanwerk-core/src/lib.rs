// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk core types, configuration and error definitions shared by the
// eSCL client crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ClientConfig, DiscoveryConfig, ScanwerkConfig, SecurityPolicy};
pub use error::ScanwerkError;
pub use types::*;
