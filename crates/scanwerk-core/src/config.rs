// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client and discovery configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScanwerkError};

/// Top-level settings for the eSCL client engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanwerkConfig {
    pub client: ClientConfig,
    pub discovery: DiscoveryConfig,
}

impl ScanwerkConfig {
    /// Load settings from a JSON file.  Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "loaded scanwerk configuration");
        Ok(config)
    }

    /// Parse settings from a JSON string and validate them.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that can never produce a working client.
    pub fn validate(&self) -> Result<()> {
        let security = &self.client.security;
        if security.require_https && security.disable_https {
            return Err(ScanwerkError::Config(
                "require_https and disable_https are mutually exclusive".into(),
            ));
        }
        if self.discovery.initial_requery_delay.is_zero() {
            return Err(ScanwerkError::Config(
                "initial_requery_delay must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Transport-level restrictions for eSCL connections.
///
/// eSCL devices almost always present self-signed certificates, so by
/// default HTTPS is used for encryption only and certificates are not
/// verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    /// Refuse plaintext HTTP entirely.
    pub require_https: bool,
    /// Verify server certificates against the system trust roots.
    pub require_trusted_certificate: bool,
    /// Always use plaintext HTTP, even for `_uscans` endpoints.
    pub disable_https: bool,
}

impl SecurityPolicy {
    /// Whether a failed TLS handshake may be retried over plaintext HTTP.
    pub fn allows_http_fallback(&self) -> bool {
        !self.require_https && !self.disable_https
    }
}

/// Settings for the eSCL protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP/TLS connection establishment timeout.
    #[serde(with = "duration_ms", rename = "connect_timeout_ms")]
    pub connect_timeout: Duration,
    /// Whole-request timeout for capability, status, job and cancel calls.
    #[serde(with = "duration_ms", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// How long to wait for the response headers of a NextDocument call.
    /// Scanners often hold the response until the page has been scanned.
    #[serde(with = "duration_ms", rename = "document_timeout_ms")]
    pub document_timeout: Duration,
    /// Maximum gap between two body chunks of a document transfer.
    #[serde(with = "duration_ms", rename = "read_timeout_ms")]
    pub read_timeout: Duration,
    /// Address the scanner by its mDNS hostname when one was advertised.
    pub prefer_hostname: bool,
    pub security: SecurityPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            document_timeout: Duration::from_secs(120),
            read_timeout: Duration::from_secs(60),
            prefer_hostname: true,
            security: SecurityPolicy::default(),
        }
    }
}

/// Settings for mDNS scanner discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Delay before the first re-query; doubled after every re-query.
    #[serde(with = "duration_ms", rename = "initial_requery_delay_ms")]
    pub initial_requery_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_requery_delay: Duration::from_secs(1),
        }
    }
}

/// Serialize a `Duration` as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
