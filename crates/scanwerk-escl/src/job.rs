// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client-side handle for a server-side scan job.

use std::fmt;

/// Lifecycle of a scan job as observed by the client.
///
/// `Created → Fetching* → Exhausted` or `Created → Fetching* → Canceled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Accepted by the scanner, no document requested yet.
    Created,
    /// At least one document has been delivered.
    Fetching,
    /// The scanner reported that no further documents exist (404).
    Exhausted,
    /// The job was canceled, either by us or on the device (410).
    Canceled,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Canceled)
    }
}

/// Handle returned by [`EsclClient::create_scan_job`](crate::EsclClient::create_scan_job).
///
/// Holds the absolute resource path of the job (e.g. `/eSCL/ScanJobs/42`)
/// and the phase it has reached.  A handle in a terminal phase is never
/// sent to the scanner again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsclJob {
    uri_path: String,
    phase: JobPhase,
    last_content_location: Option<String>,
}

impl EsclJob {
    /// Wrap a job path, e.g. one recovered from a `ScannerStatus` job list.
    pub fn new(uri_path: impl Into<String>) -> Self {
        let uri_path = uri_path.into();
        let uri_path = if uri_path.starts_with('/') {
            uri_path
        } else {
            format!("/{uri_path}")
        };
        Self {
            uri_path: uri_path.trim_end_matches('/').to_owned(),
            phase: JobPhase::Created,
            last_content_location: None,
        }
    }

    /// Absolute path of the job resource.
    pub fn uri_path(&self) -> &str {
        &self.uri_path
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub(crate) fn mark_fetching(&mut self, content_location: Option<&str>) {
        self.phase = JobPhase::Fetching;
        if content_location.is_some() {
            self.last_content_location = content_location.map(str::to_owned);
        }
    }

    pub(crate) fn mark_exhausted(&mut self) {
        self.phase = JobPhase::Exhausted;
    }

    pub(crate) fn mark_canceled(&mut self) {
        self.phase = JobPhase::Canceled;
    }

    /// Whether `content_location` repeats the previously delivered page.
    pub(crate) fn is_repeat_delivery(&self, content_location: Option<&str>) -> bool {
        match (content_location, &self.last_content_location) {
            (Some(current), Some(previous)) => current == previous,
            _ => false,
        }
    }
}

impl fmt::Display for EsclJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri_path)
    }
}
