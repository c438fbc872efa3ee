// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanner status parsing (`scan:ScannerStatus`).

use std::collections::HashMap;

use tracing::debug;

use scanwerk_core::error::Result;
use scanwerk_core::types::{AdfState, JobState, ScannerState, ScannerStatus};

use crate::xml::{self, Ns};

/// Parse a status document.
///
/// Only a wrong root element or broken XML fails; unrecognised or missing
/// state values map to the `Unknown` variants.
pub fn parse_status(text: &str) -> Result<ScannerStatus> {
    let doc = xml::parse_document(text)?;
    let root = xml::expect_root(&doc, Ns::Scan, "ScannerStatus")?;

    let mut job_states = HashMap::new();
    if let Some(jobs) = xml::child(root, Ns::Scan, "Jobs") {
        for info in xml::children(jobs, Ns::Scan, "JobInfo") {
            let uri = xml::child_text(info, Ns::Pwg, "JobUri");
            let state = xml::child_text(info, Ns::Pwg, "JobState")
                .map(|s| JobState::from_wire(&s))
                .unwrap_or(JobState::Unknown);
            if let Some(uri) = uri {
                if state != JobState::Unknown {
                    job_states.insert(uri, state);
                }
            }
        }
    }

    let status = ScannerStatus {
        state: xml::child_text(root, Ns::Pwg, "State")
            .map(|s| ScannerState::from_wire(&s))
            .unwrap_or(ScannerState::Unknown),
        adf_state: xml::child_text(root, Ns::Scan, "AdfState")
            .map(|s| AdfState::from_wire(&s))
            .unwrap_or(AdfState::Unknown),
        job_states,
    };
    debug!(state = ?status.state, adf_state = ?status.adf_state, jobs = status.job_states.len(), "parsed scanner status");
    Ok(status)
}
