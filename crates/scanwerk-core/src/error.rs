// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Document errors --
    #[error("malformed eSCL document: {0}")]
    MalformedDocument(String),

    #[error("setting profile reference '{0}' does not match any earlier profile")]
    UnresolvedProfile(String),

    // -- Transport errors --
    #[error("{operation} returned HTTP status {status}")]
    Http { operation: &'static str, status: u16 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("eSCL protocol violation: {0}")]
    Protocol(String),

    #[error("security policy violation: {0}")]
    SecurityPolicy(String),

    // -- Discovery errors --
    #[error("scanner discovery failed: {0}")]
    Discovery(String),

    #[error("scanner discovery already started")]
    AlreadyStarted,

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanwerkError {
    /// Whether this error came from the document content rather than the
    /// network.  Such errors are never worth retrying against the same
    /// device.
    pub fn is_malformed_document(&self) -> bool {
        matches!(self, Self::MalformedDocument(_) | Self::UnresolvedProfile(_))
    }

    /// Whether this error is a network-level failure (non-success status,
    /// connection failure or timeout).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Transport(_) | Self::Timeout(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;
