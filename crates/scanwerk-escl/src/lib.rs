// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk eSCL: mDNS scanner discovery, capability negotiation, and the
// scan job protocol.  This crate bridges between the value types defined in
// `scanwerk-core` and the scanners on the local network.

pub mod capabilities;
pub mod client;
pub mod discovery;
pub mod job;
pub mod status;
pub mod xml;

pub use client::{EsclClient, FetchOptions, ProgressCallback};
pub use discovery::ScannerDiscovery;
pub use job::{EsclJob, JobPhase};
