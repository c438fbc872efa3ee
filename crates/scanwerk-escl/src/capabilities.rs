// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanner capability parsing (`scan:ScannerCapabilities`).
//
// Setting profiles can be declared once (usually in a root-level
// `SettingProfiles` table) and referenced from each input source with
// `<scan:SettingProfile ref="name"/>`.  A single name table is threaded
// through the whole parse so that references resolve against every profile
// defined earlier in the document.

use std::collections::HashMap;

use roxmltree::Node;
use tracing::{debug, trace};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{
    Capabilities, ColorMode, DiscreteResolution, InputCaps, Range, SettingProfile,
};

use crate::xml::{self, Ns};

/// Protocol version assumed when the document does not state one.
pub const DEFAULT_VERSION: &str = "2.0";

/// Named profiles seen so far in the current document.
type ProfileTable = HashMap<String, SettingProfile>;

/// Parse a capabilities document.
pub fn parse_capabilities(text: &str) -> Result<Capabilities> {
    let doc = xml::parse_document(text)?;
    let root = xml::expect_root(&doc, Ns::Scan, "ScannerCapabilities")?;

    let mut profiles = ProfileTable::new();
    if let Some(table) = xml::child(root, Ns::Scan, "SettingProfiles") {
        for el in xml::children(table, Ns::Scan, "SettingProfile") {
            parse_setting_profile(el, &mut profiles)?;
        }
    }

    let platen = xml::child(root, Ns::Scan, "Platen")
        .and_then(|p| xml::child(p, Ns::Scan, "PlatenInputCaps"));
    let adf = xml::child(root, Ns::Scan, "Adf");
    let adf_simplex = adf.and_then(|a| xml::child(a, Ns::Scan, "AdfSimplexInputCaps"));
    let adf_duplex = adf.and_then(|a| xml::child(a, Ns::Scan, "AdfDuplexInputCaps"));

    let adf_options = adf
        .and_then(|a| xml::child(a, Ns::Scan, "AdfOptions"))
        .map(|opts| {
            xml::children(opts, Ns::Scan, "AdfOption")
                .map(xml::text_of)
                .collect()
        })
        .unwrap_or_default();

    let caps = Capabilities {
        version: xml::child_text(root, Ns::Pwg, "Version")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_owned()),
        make_and_model: xml::child_text(root, Ns::Pwg, "MakeAndModel"),
        serial_number: xml::child_text(root, Ns::Pwg, "SerialNumber"),
        manufacturer: xml::child_text(root, Ns::Scan, "Manufacturer")
            .or_else(|| xml::child_text(root, Ns::Pwg, "Manufacturer")),
        uuid: xml::child_text(root, Ns::Scan, "UUID"),
        admin_uri: xml::child_text(root, Ns::Scan, "AdminURI"),
        icon_uri: xml::child_text(root, Ns::Scan, "IconURI"),
        platen: platen
            .map(|el| parse_input_caps(el, &mut profiles))
            .transpose()?,
        adf_simplex: adf_simplex
            .map(|el| parse_input_caps(el, &mut profiles))
            .transpose()?,
        adf_duplex: adf_duplex
            .map(|el| parse_input_caps(el, &mut profiles))
            .transpose()?,
        compression_factor: xml::child(root, Ns::Scan, "CompressionFactorSupport")
            .map(parse_range)
            .transpose()?
            .flatten(),
        adf_options,
    };

    debug!(
        version = %caps.version,
        make_and_model = ?caps.make_and_model,
        platen = caps.platen.is_some(),
        adf_simplex = caps.adf_simplex.is_some(),
        adf_duplex = caps.adf_duplex.is_some(),
        named_profiles = profiles.len(),
        "parsed scanner capabilities"
    );
    Ok(caps)
}

/// Parse one `SettingProfile` element, either an inline definition or a
/// `ref` to a profile already in `profiles`.
///
/// Named inline definitions are added to the table; anonymous ones are
/// returned but never recorded.
fn parse_setting_profile(el: Node<'_, '_>, profiles: &mut ProfileTable) -> Result<SettingProfile> {
    if let Some(reference) = el.attribute("ref") {
        trace!(reference, "resolving setting profile reference");
        return profiles
            .get(reference)
            .cloned()
            .ok_or_else(|| ScanwerkError::UnresolvedProfile(reference.to_owned()));
    }

    let formats = xml::child(el, Ns::Scan, "DocumentFormats");
    let resolutions = xml::child(el, Ns::Scan, "SupportedResolutions");
    // Ranges appear either directly under SupportedResolutions or wrapped in
    // a ResolutionRange element.
    let range_parent =
        resolutions.map(|r| xml::child(r, Ns::Scan, "ResolutionRange").unwrap_or(r));

    let profile = SettingProfile {
        name: el.attribute("name").map(str::to_owned),
        color_modes: xml::child(el, Ns::Scan, "ColorModes")
            .map(|modes| {
                xml::children(modes, Ns::Scan, "ColorMode")
                    .filter_map(|m| ColorMode::from_wire(&xml::text_of(m)))
                    .collect()
            })
            .unwrap_or_default(),
        document_formats: formats
            .map(|f| {
                xml::children(f, Ns::Pwg, "DocumentFormat")
                    .map(xml::text_of)
                    .collect()
            })
            .unwrap_or_default(),
        document_formats_ext: formats
            .map(|f| {
                xml::children(f, Ns::Scan, "DocumentFormatExt")
                    .map(xml::text_of)
                    .collect()
            })
            .unwrap_or_default(),
        discrete_resolutions: resolutions
            .and_then(|r| xml::child(r, Ns::Scan, "DiscreteResolutions"))
            .map(parse_discrete_resolutions)
            .transpose()?
            .unwrap_or_default(),
        x_resolution_range: range_parent
            .and_then(|r| xml::child(r, Ns::Scan, "XResolutionRange"))
            .map(parse_range)
            .transpose()?
            .flatten(),
        y_resolution_range: range_parent
            .and_then(|r| xml::child(r, Ns::Scan, "YResolutionRange"))
            .map(parse_range)
            .transpose()?
            .flatten(),
    };

    if let Some(name) = &profile.name {
        profiles.insert(name.clone(), profile.clone());
    }
    Ok(profile)
}

fn parse_input_caps(el: Node<'_, '_>, profiles: &mut ProfileTable) -> Result<InputCaps> {
    let mut setting_profiles = Vec::new();
    if let Some(list) = xml::child(el, Ns::Scan, "SettingProfiles") {
        for profile_el in xml::children(list, Ns::Scan, "SettingProfile") {
            setting_profiles.push(parse_setting_profile(profile_el, profiles)?);
        }
    }

    Ok(InputCaps {
        min_width: xml::child_u32(el, Ns::Scan, "MinWidth")?,
        max_width: xml::child_u32(el, Ns::Scan, "MaxWidth")?,
        min_height: xml::child_u32(el, Ns::Scan, "MinHeight")?,
        max_height: xml::child_u32(el, Ns::Scan, "MaxHeight")?,
        max_scan_regions: xml::child_u32(el, Ns::Scan, "MaxScanRegions")?,
        setting_profiles,
    })
}

/// Parse a `Min`/`Max`/`Normal`/`Step` range.
///
/// Returns `Ok(None)` unless min, max and normal are all present.  A missing
/// step defaults to 1.
pub fn parse_range(el: Node<'_, '_>) -> Result<Option<Range>> {
    let min = xml::child_u32(el, Ns::Scan, "Min")?;
    let max = xml::child_u32(el, Ns::Scan, "Max")?;
    let normal = xml::child_u32(el, Ns::Scan, "Normal")?;
    let step = xml::child_u32(el, Ns::Scan, "Step")?;

    Ok(match (min, max, normal) {
        (Some(min), Some(max), Some(normal)) => Some(Range {
            min,
            max,
            normal,
            step: step.unwrap_or(1),
        }),
        _ => None,
    })
}

fn parse_discrete_resolutions(el: Node<'_, '_>) -> Result<Vec<DiscreteResolution>> {
    let mut list = Vec::new();
    for res in xml::children(el, Ns::Scan, "DiscreteResolution") {
        let x = xml::child_u32(res, Ns::Scan, "XResolution")?;
        let y = xml::child_u32(res, Ns::Scan, "YResolution")?;
        if let (Some(x), Some(y)) = (x, y) {
            list.push(DiscreteResolution { x, y });
        }
    }
    Ok(list)
}
