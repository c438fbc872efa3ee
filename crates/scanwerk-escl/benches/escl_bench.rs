// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for capability/status parsing and scan-settings
// serialization in the scanwerk-escl crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use scanwerk_core::types::{ColorMode, InputSource, ScanSettings};
use scanwerk_escl::capabilities::parse_capabilities;
use scanwerk_escl::status::parse_status;
use scanwerk_escl::xml::scan_settings_document;

/// A flatbed + duplex feeder scanner with a shared named profile.
const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<scan:ScannerCapabilities xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"
                          xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm">
    <pwg:Version>2.63</pwg:Version>
    <pwg:MakeAndModel>Bench Scanner 9000</pwg:MakeAndModel>
    <pwg:SerialNumber>BS9000-0001</pwg:SerialNumber>
    <scan:UUID>4509a320-00a0-008f-00b6-002507510eca</scan:UUID>
    <scan:SettingProfiles>
        <scan:SettingProfile name="default">
            <scan:ColorModes>
                <scan:ColorMode>BlackAndWhite1</scan:ColorMode>
                <scan:ColorMode>Grayscale8</scan:ColorMode>
                <scan:ColorMode>RGB24</scan:ColorMode>
            </scan:ColorModes>
            <scan:DocumentFormats>
                <pwg:DocumentFormat>image/jpeg</pwg:DocumentFormat>
                <pwg:DocumentFormat>application/pdf</pwg:DocumentFormat>
                <scan:DocumentFormatExt>image/jpeg</scan:DocumentFormatExt>
                <scan:DocumentFormatExt>application/pdf</scan:DocumentFormatExt>
            </scan:DocumentFormats>
            <scan:SupportedResolutions>
                <scan:DiscreteResolutions>
                    <scan:DiscreteResolution><scan:XResolution>75</scan:XResolution><scan:YResolution>75</scan:YResolution></scan:DiscreteResolution>
                    <scan:DiscreteResolution><scan:XResolution>150</scan:XResolution><scan:YResolution>150</scan:YResolution></scan:DiscreteResolution>
                    <scan:DiscreteResolution><scan:XResolution>300</scan:XResolution><scan:YResolution>300</scan:YResolution></scan:DiscreteResolution>
                    <scan:DiscreteResolution><scan:XResolution>600</scan:XResolution><scan:YResolution>600</scan:YResolution></scan:DiscreteResolution>
                </scan:DiscreteResolutions>
            </scan:SupportedResolutions>
        </scan:SettingProfile>
    </scan:SettingProfiles>
    <scan:Platen>
        <scan:PlatenInputCaps>
            <scan:MinWidth>16</scan:MinWidth>
            <scan:MaxWidth>2550</scan:MaxWidth>
            <scan:MinHeight>16</scan:MinHeight>
            <scan:MaxHeight>3508</scan:MaxHeight>
            <scan:MaxScanRegions>1</scan:MaxScanRegions>
            <scan:SettingProfiles><scan:SettingProfile ref="default"/></scan:SettingProfiles>
        </scan:PlatenInputCaps>
    </scan:Platen>
    <scan:Adf>
        <scan:AdfSimplexInputCaps>
            <scan:MaxWidth>2550</scan:MaxWidth>
            <scan:MaxHeight>4200</scan:MaxHeight>
            <scan:SettingProfiles><scan:SettingProfile ref="default"/></scan:SettingProfiles>
        </scan:AdfSimplexInputCaps>
        <scan:AdfDuplexInputCaps>
            <scan:MaxWidth>2550</scan:MaxWidth>
            <scan:MaxHeight>4200</scan:MaxHeight>
            <scan:SettingProfiles><scan:SettingProfile ref="default"/></scan:SettingProfiles>
        </scan:AdfDuplexInputCaps>
        <scan:AdfOptions>
            <scan:AdfOption>DetectPaperLoaded</scan:AdfOption>
            <scan:AdfOption>Duplex</scan:AdfOption>
        </scan:AdfOptions>
    </scan:Adf>
    <scan:CompressionFactorSupport>
        <scan:Min>0</scan:Min><scan:Max>100</scan:Max><scan:Normal>25</scan:Normal><scan:Step>1</scan:Step>
    </scan:CompressionFactorSupport>
</scan:ScannerCapabilities>"#;

const STATUS: &str = r#"<scan:ScannerStatus xmlns:scan="http://schemas.hp.com/imaging/escl/2011/05/03"
                    xmlns:pwg="http://www.pwg.org/schemas/2010/12/sm">
    <pwg:State>Processing</pwg:State>
    <scan:AdfState>ScannerAdfLoaded</scan:AdfState>
    <scan:Jobs>
        <scan:JobInfo><pwg:JobUri>/eSCL/ScanJobs/3</pwg:JobUri><pwg:JobState>Processing</pwg:JobState></scan:JobInfo>
        <scan:JobInfo><pwg:JobUri>/eSCL/ScanJobs/2</pwg:JobUri><pwg:JobState>Completed</pwg:JobState></scan:JobInfo>
    </scan:Jobs>
</scan:ScannerStatus>"#;

fn bench_parse_capabilities(c: &mut Criterion) {
    c.bench_function("parse_capabilities", |b| {
        b.iter(|| parse_capabilities(black_box(CAPABILITIES)))
    });
}

fn bench_parse_status(c: &mut Criterion) {
    c.bench_function("parse_status", |b| b.iter(|| parse_status(black_box(STATUS))));
}

fn bench_scan_settings_document(c: &mut Criterion) {
    let settings = ScanSettings {
        input_source: InputSource::Feeder,
        duplex: true,
        color_mode: ColorMode::Grayscale8,
        compression_factor: Some(25),
        ..Default::default()
    };
    c.bench_function("scan_settings_document", |b| {
        b.iter(|| scan_settings_document(black_box(&settings)))
    });
}

criterion_group!(
    benches,
    bench_parse_capabilities,
    bench_parse_status,
    bench_scan_settings_document
);
criterion_main!(benches);
