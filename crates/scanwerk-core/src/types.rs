// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk eSCL client.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// A scanner endpoint resolved from an `_uscan._tcp` / `_uscans._tcp`
/// advertisement (or entered manually).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Human-readable scanner name (TXT `ty`).
    pub name: String,
    /// mDNS service instance label.
    pub instance_name: String,
    /// Device identity (TXT `uuid`).  Not guaranteed to be RFC 4122 formatted.
    pub uuid: Option<String>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    /// mDNS hostname from the SRV record, e.g. `scanner.local.`.
    pub host: Option<String>,
    pub port: u16,
    /// Whether the endpoint was advertised as `_uscans` (HTTPS).
    pub tls: bool,
    /// Resource root without leading or trailing slash (TXT `rs`).
    pub root_path: String,
    pub admin_url: Option<String>,
    /// Icon URL (TXT `representation`).
    pub icon_url: Option<String>,
    /// Supported MIME types (TXT `pdl`).
    pub mime_types: Vec<String>,
    /// Color capabilities (TXT `cs`), e.g. `color`, `grayscale`, `binary`.
    pub color_options: Vec<String>,
    /// Input sources (TXT `is`), e.g. `platen`, `adf`.
    pub input_sources: Vec<String>,
    pub duplex_supported: bool,
    pub txt_version: Option<String>,
    pub escl_version: Option<String>,
    pub note: Option<String>,
}

impl ServiceEndpoint {
    /// Build an endpoint for a scanner whose address is already known.
    pub fn from_address(addr: SocketAddr, root_path: &str, tls: bool) -> Self {
        let (ipv4, ipv6) = match addr.ip() {
            IpAddr::V4(v4) => (Some(v4), None),
            IpAddr::V6(v6) => (None, Some(v6)),
        };
        Self {
            name: addr.ip().to_string(),
            instance_name: addr.to_string(),
            uuid: None,
            ipv4,
            ipv6,
            host: None,
            port: addr.port(),
            tls,
            root_path: root_path.trim_matches('/').to_owned(),
            admin_url: None,
            icon_url: None,
            mime_types: Vec::new(),
            color_options: Vec::new(),
            input_sources: Vec::new(),
            duplex_supported: false,
            txt_version: None,
            escl_version: None,
            note: None,
        }
    }

    /// Preferred transport address: IPv6 when both families were advertised.
    pub fn address(&self) -> Option<IpAddr> {
        self.ipv6
            .map(IpAddr::V6)
            .or_else(|| self.ipv4.map(IpAddr::V4))
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Root capability document of a scanner (`scan:ScannerCapabilities`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub version: String,
    pub make_and_model: Option<String>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub uuid: Option<String>,
    pub admin_uri: Option<String>,
    pub icon_uri: Option<String>,
    pub compression_factor: Option<Range>,
    pub platen: Option<InputCaps>,
    pub adf_simplex: Option<InputCaps>,
    pub adf_duplex: Option<InputCaps>,
    /// Feeder options such as `DetectPaperLoaded` or `Duplex`.
    pub adf_options: Vec<String>,
}

impl Capabilities {
    /// Capabilities applying to a scan from `source`.
    ///
    /// Duplex feeder scans fall back to the simplex caps when the device
    /// does not describe its duplex path separately.
    pub fn input_caps(&self, source: InputSource, duplex: bool) -> Option<&InputCaps> {
        match (source, duplex) {
            (InputSource::Platen, _) => self.platen.as_ref(),
            (InputSource::Feeder, true) => self.adf_duplex.as_ref().or(self.adf_simplex.as_ref()),
            (InputSource::Feeder, false) => self.adf_simplex.as_ref(),
            (InputSource::Camera, _) => None,
        }
    }
}

/// Per-source limits (`PlatenInputCaps`, `AdfSimplexInputCaps`, ...).
///
/// Lengths are in 1/300 inch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCaps {
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub max_scan_regions: Option<u32>,
    pub setting_profiles: Vec<SettingProfile>,
}

impl InputCaps {
    /// Union of the color modes of all profiles, in first-seen order.
    pub fn color_modes(&self) -> Vec<ColorMode> {
        let mut modes = Vec::new();
        for mode in self.setting_profiles.iter().flat_map(|p| &p.color_modes) {
            if !modes.contains(mode) {
                modes.push(*mode);
            }
        }
        modes
    }

    /// Whether any profile accepts the given resolution.
    pub fn supports_resolution(&self, x: u32, y: u32) -> bool {
        self.setting_profiles
            .iter()
            .any(|p| p.supports_resolution(x, y))
    }
}

/// A bundle of supported scan parameters.  Named profiles can be shared
/// between input sources by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingProfile {
    /// `None` for anonymous profiles.
    pub name: Option<String>,
    pub color_modes: Vec<ColorMode>,
    pub document_formats: Vec<String>,
    pub document_formats_ext: Vec<String>,
    pub discrete_resolutions: Vec<DiscreteResolution>,
    pub x_resolution_range: Option<Range>,
    pub y_resolution_range: Option<Range>,
}

impl SettingProfile {
    pub fn supports_resolution(&self, x: u32, y: u32) -> bool {
        let discrete = self
            .discrete_resolutions
            .iter()
            .any(|r| r.x == x && r.y == y);
        let continuous = match (&self.x_resolution_range, &self.y_resolution_range) {
            (Some(xr), Some(yr)) => xr.contains(x) && yr.contains(y),
            _ => false,
        };
        discrete || continuous
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscreteResolution {
    pub x: u32,
    pub y: u32,
}

/// A continuous value range: (min, max, normal, step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: u32,
    pub max: u32,
    pub normal: u32,
    pub step: u32,
}

impl Range {
    /// Whether `value` lies within the range and on a step boundary.
    pub fn contains(&self, value: u32) -> bool {
        if value < self.min || value > self.max {
            return false;
        }
        self.step <= 1 || (value - self.min) % self.step == 0
    }
}

/// eSCL color modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    BlackAndWhite1,
    Grayscale8,
    Grayscale16,
    Rgb24,
    Rgb48,
}

impl ColorMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::BlackAndWhite1 => "BlackAndWhite1",
            Self::Grayscale8 => "Grayscale8",
            Self::Grayscale16 => "Grayscale16",
            Self::Rgb24 => "RGB24",
            Self::Rgb48 => "RGB48",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "BlackAndWhite1" => Some(Self::BlackAndWhite1),
            "Grayscale8" => Some(Self::Grayscale8),
            "Grayscale16" => Some(Self::Grayscale16),
            "RGB24" => Some(Self::Rgb24),
            "RGB48" => Some(Self::Rgb48),
            _ => None,
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Overall scanner state (`pwg:State`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScannerState {
    Idle,
    Processing,
    Testing,
    Stopped,
    Down,
    Unknown,
}

impl ScannerState {
    /// Map a wire value; anything unrecognised becomes `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "Idle" => Self::Idle,
            "Processing" => Self::Processing,
            "Testing" => Self::Testing,
            "Stopped" => Self::Stopped,
            "Down" => Self::Down,
            _ => Self::Unknown,
        }
    }
}

/// Automatic document feeder state (`scan:AdfState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdfState {
    ScannerAdfProcessing,
    ScannerAdfEmpty,
    ScannerAdfJam,
    ScannerAdfLoaded,
    ScannerAdfMispick,
    ScannerAdfHatchOpen,
    ScannerAdfDuplexPageTooShort,
    ScannerAdfDuplexPageTooLong,
    ScannerAdfMultipickDetected,
    ScannerAdfInputTrayFailed,
    ScannerAdfInputTrayOverloaded,
    Unknown,
}

impl AdfState {
    /// Map a wire value; anything unrecognised becomes `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "ScannerAdfProcessing" => Self::ScannerAdfProcessing,
            "ScannerAdfEmpty" => Self::ScannerAdfEmpty,
            "ScannerAdfJam" => Self::ScannerAdfJam,
            // Some HP firmware misspells the loaded state.
            "ScannerAdfLoaded" | "ScannedAdfLoaded" => Self::ScannerAdfLoaded,
            "ScannerAdfMispick" => Self::ScannerAdfMispick,
            "ScannerAdfHatchOpen" => Self::ScannerAdfHatchOpen,
            "ScannerAdfDuplexPageTooShort" => Self::ScannerAdfDuplexPageTooShort,
            "ScannerAdfDuplexPageTooLong" => Self::ScannerAdfDuplexPageTooLong,
            "ScannerAdfMultipickDetected" => Self::ScannerAdfMultipickDetected,
            "ScannerAdfInputTrayFailed" => Self::ScannerAdfInputTrayFailed,
            "ScannerAdfInputTrayOverloaded" => Self::ScannerAdfInputTrayOverloaded,
            _ => Self::Unknown,
        }
    }
}

/// Server-side job state (`pwg:JobState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Canceled,
    Aborted,
    Unknown,
}

impl JobState {
    pub fn from_wire(value: &str) -> Self {
        match value.trim() {
            "Pending" => Self::Pending,
            "Processing" => Self::Processing,
            "Completed" => Self::Completed,
            "Canceled" => Self::Canceled,
            "Aborted" => Self::Aborted,
            _ => Self::Unknown,
        }
    }
}

/// Parsed `scan:ScannerStatus` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerStatus {
    pub state: ScannerState,
    pub adf_state: AdfState,
    /// Known job URIs and their states.  Jobs in an unknown state are omitted.
    pub job_states: HashMap<String, JobState>,
}

// ---------------------------------------------------------------------------
// Scan jobs
// ---------------------------------------------------------------------------

/// Where the paper is scanned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputSource {
    Platen,
    Feeder,
    Camera,
}

impl InputSource {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Platen => "Platen",
            Self::Feeder => "Feeder",
            Self::Camera => "Camera",
        }
    }
}

/// Scan intent hint (`scan:Intent`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanIntent {
    Document,
    TextAndGraphic,
    Photo,
    Preview,
    Object,
    BusinessCard,
}

impl ScanIntent {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::TextAndGraphic => "TextAndGraphic",
            Self::Photo => "Photo",
            Self::Preview => "Preview",
            Self::Object => "Object",
            Self::BusinessCard => "BusinessCard",
        }
    }
}

/// Parameters of a scan job.  Region lengths are in 1/300 inch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub version: String,
    pub intent: ScanIntent,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub input_source: InputSource,
    pub duplex: bool,
    pub color_mode: ColorMode,
    pub x_resolution: u32,
    pub y_resolution: u32,
    pub compression_factor: Option<u32>,
    pub document_format: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            version: "2.0".into(),
            intent: ScanIntent::TextAndGraphic,
            // US Letter
            width: 2550,
            height: 3300,
            x_offset: 0,
            y_offset: 0,
            input_source: InputSource::Platen,
            duplex: false,
            color_mode: ColorMode::Rgb24,
            x_resolution: 300,
            y_resolution: 300,
            compression_factor: None,
            document_format: "image/jpeg".into(),
        }
    }
}

/// One page retrieved from a scan job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub data: Vec<u8>,
    /// Media type of the body, without parameters.
    pub content_type: Option<String>,
    /// `Content-Location` of the page, used to spot duplicate deliveries.
    pub content_location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_prefers_ipv6() {
        let mut endpoint =
            ServiceEndpoint::from_address("192.168.1.20:80".parse().unwrap(), "/eSCL/", false);
        assert_eq!(endpoint.root_path, "eSCL");
        assert_eq!(endpoint.address(), Some("192.168.1.20".parse().unwrap()));

        endpoint.ipv6 = Some("fe80::1".parse().unwrap());
        assert_eq!(endpoint.address(), Some("fe80::1".parse().unwrap()));
    }

    #[test]
    fn unknown_states_map_to_unknown() {
        assert_eq!(ScannerState::from_wire("Idle"), ScannerState::Idle);
        assert_eq!(ScannerState::from_wire("Warming"), ScannerState::Unknown);
        assert_eq!(AdfState::from_wire("ScannedAdfLoaded"), AdfState::ScannerAdfLoaded);
        assert_eq!(AdfState::from_wire(""), AdfState::Unknown);
        assert_eq!(JobState::from_wire("Completed"), JobState::Completed);
        assert_eq!(JobState::from_wire("Paused"), JobState::Unknown);
    }

    #[test]
    fn color_mode_wire_names() {
        assert_eq!(ColorMode::Rgb24.as_wire(), "RGB24");
        assert_eq!(ColorMode::from_wire(" Grayscale8 "), Some(ColorMode::Grayscale8));
        assert_eq!(ColorMode::from_wire("CMYK32"), None);
    }

    #[test]
    fn range_contains_respects_step() {
        let range = Range {
            min: 75,
            max: 1200,
            normal: 300,
            step: 25,
        };
        assert!(range.contains(300));
        assert!(!range.contains(310));
        assert!(!range.contains(1225));
    }

    #[test]
    fn duplex_feeder_falls_back_to_simplex_caps() {
        let simplex = InputCaps {
            max_width: Some(2550),
            ..Default::default()
        };
        let caps = Capabilities {
            version: "2.6".into(),
            make_and_model: None,
            serial_number: None,
            manufacturer: None,
            uuid: None,
            admin_uri: None,
            icon_uri: None,
            compression_factor: None,
            platen: None,
            adf_simplex: Some(simplex.clone()),
            adf_duplex: None,
            adf_options: Vec::new(),
        };
        assert_eq!(caps.input_caps(InputSource::Feeder, true), Some(&simplex));
        assert_eq!(caps.input_caps(InputSource::Platen, false), None);
    }

    #[test]
    fn profile_resolution_support() {
        let profile = SettingProfile {
            discrete_resolutions: vec![DiscreteResolution { x: 200, y: 200 }],
            x_resolution_range: Some(Range {
                min: 75,
                max: 600,
                normal: 300,
                step: 1,
            }),
            y_resolution_range: Some(Range {
                min: 75,
                max: 600,
                normal: 300,
                step: 1,
            }),
            ..Default::default()
        };
        assert!(profile.supports_resolution(200, 200));
        assert!(profile.supports_resolution(450, 450));
        assert!(!profile.supports_resolution(1200, 1200));
    }
}
