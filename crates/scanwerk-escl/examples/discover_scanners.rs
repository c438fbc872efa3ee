// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Browse the LAN for eSCL scanners and print what each one can do.
//
//     RUST_LOG=scanwerk_escl=debug cargo run -p scanwerk-escl --example discover_scanners [seconds] [config.json]

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use scanwerk_core::config::ScanwerkConfig;
use scanwerk_escl::{EsclClient, ScannerDiscovery};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);
    let config = match args.next() {
        Some(path) => ScanwerkConfig::load(path)?,
        None => ScanwerkConfig::default(),
    };

    println!("Browsing for scanners for {seconds}s...");
    let discovery = config.discovery.clone();
    let endpoints = tokio::task::spawn_blocking(move || {
        ScannerDiscovery::browse_for(discovery, Duration::from_secs(seconds))
    })
    .await??;

    if endpoints.is_empty() {
        println!("No scanners found.");
        return Ok(());
    }

    for endpoint in endpoints {
        println!();
        println!(
            "{} ({}:{}, {})",
            endpoint.name,
            endpoint.host.as_deref().unwrap_or("?"),
            endpoint.port,
            if endpoint.tls { "https" } else { "http" }
        );

        let client = EsclClient::with_config(endpoint, config.client.clone())?;
        match client.get_capabilities().await {
            Ok(caps) => {
                println!("  model:   {}", caps.make_and_model.as_deref().unwrap_or("unknown"));
                println!("  version: {}", caps.version);
                for (label, input) in [
                    ("platen", &caps.platen),
                    ("adf", &caps.adf_simplex),
                    ("adf duplex", &caps.adf_duplex),
                ] {
                    if let Some(input) = input {
                        let modes: Vec<String> =
                            input.color_modes().iter().map(ToString::to_string).collect();
                        println!("  {label}: {}", modes.join(", "));
                    }
                }
            }
            Err(e) => println!("  capabilities unavailable: {e}"),
        }
        match client.get_status().await {
            Ok(status) => println!("  state:   {:?} / {:?}", status.state, status.adf_state),
            Err(e) => println!("  status unavailable: {e}"),
        }
    }
    Ok(())
}
