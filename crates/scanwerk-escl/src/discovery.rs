// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS service discovery for eSCL scanners on the local network.
//
// We browse for `_uscan._tcp.local.` (plain HTTP) and `_uscans._tcp.local.`
// (HTTPS) using the `mdns-sd` crate.  Every resolved service is reduced to a
// list of DNS records, parsed into a `ServiceEndpoint` and handed to the
// caller's callback once per unique device.  Browsing is repeated with a
// doubling delay until the discovery engine is shut down.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, trace, warn};

use scanwerk_core::config::DiscoveryConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::ServiceEndpoint;

/// Resource root assumed when a scanner does not advertise `rs`.
const DEFAULT_ROOT_PATH: &str = "eSCL";

/// The two eSCL service types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// `_uscan._tcp`, plaintext HTTP.
    Uscan,
    /// `_uscans._tcp`, HTTPS.
    Uscans,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Uscan, ServiceKind::Uscans];

    /// Fully-qualified mDNS service type.
    pub fn service_type(&self) -> &'static str {
        match self {
            Self::Uscan => "_uscan._tcp.local.",
            Self::Uscans => "_uscans._tcp.local.",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Uscans)
    }
}

/// A DNS record relevant to a scanner advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecord {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Srv {
        kind: ServiceKind,
        target: String,
        port: u16,
    },
    /// Raw `key=value` TXT strings.
    Txt(Vec<String>),
}

/// One received advertisement: the records announced for a service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub instance_name: String,
    pub records: Vec<DnsRecord>,
}

impl Advertisement {
    /// Flatten a resolved `mdns-sd` service into records.
    pub fn from_service_info(info: &ServiceInfo, kind: ServiceKind) -> Self {
        let fullname = info.get_fullname();
        let instance_name = fullname
            .strip_suffix(kind.service_type())
            .map(|s| s.trim_end_matches('.'))
            .unwrap_or(fullname)
            .to_owned();

        // Routable IPv6 before link-local so the preferred address is usable
        // without a zone index.
        let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
        addresses.sort_by_key(|ip| (is_link_local(ip), *ip));

        let mut records: Vec<DnsRecord> = addresses
            .into_iter()
            .map(|ip| match ip {
                IpAddr::V4(v4) => DnsRecord::A(v4),
                IpAddr::V6(v6) => DnsRecord::Aaaa(v6),
            })
            .collect();
        records.push(DnsRecord::Srv {
            kind,
            target: info.get_hostname().to_owned(),
            port: info.get_port(),
        });
        records.push(DnsRecord::Txt(
            info.get_properties()
                .iter()
                .map(|p| format!("{}={}", p.key(), p.val_str()))
                .collect(),
        ));

        Self {
            instance_name,
            records,
        }
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

/// Parse an advertisement into an endpoint.
///
/// An advertisement without an address, a port or a host is rejected.  When
/// both service types are present, the `_uscans` service wins.
pub fn parse_advertisement(advertisement: &Advertisement) -> Result<ServiceEndpoint> {
    let mut ipv4 = None;
    let mut ipv6 = None;
    let mut srv: Option<(ServiceKind, &str, u16)> = None;
    let mut txt: HashMap<String, String> = HashMap::new();

    for record in &advertisement.records {
        match record {
            DnsRecord::A(addr) => {
                ipv4.get_or_insert(*addr);
            }
            DnsRecord::Aaaa(addr) => {
                ipv6.get_or_insert(*addr);
            }
            DnsRecord::Srv { kind, target, port } => {
                let replace = match srv {
                    None => true,
                    Some((current, _, _)) => kind.is_tls() && !current.is_tls(),
                };
                if replace {
                    srv = Some((*kind, target.as_str(), *port));
                }
            }
            DnsRecord::Txt(entries) => {
                for entry in entries {
                    let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                    txt.entry(key.trim().to_ascii_lowercase())
                        .or_insert_with(|| value.trim().to_owned());
                }
            }
        }
    }

    let instance = &advertisement.instance_name;
    if ipv4.is_none() && ipv6.is_none() {
        return Err(ScanwerkError::Discovery(format!("{instance}: no address record")));
    }
    let (kind, host, port) = srv
        .ok_or_else(|| ScanwerkError::Discovery(format!("{instance}: no service record")))?;
    if port == 0 {
        return Err(ScanwerkError::Discovery(format!("{instance}: no port")));
    }
    let host = host.trim();
    if host.is_empty() {
        return Err(ScanwerkError::Discovery(format!("{instance}: no host")));
    }

    let name = txt
        .get("ty")
        .filter(|ty| !ty.is_empty())
        .cloned()
        .unwrap_or_else(|| instance.clone());
    let root_path = txt
        .get("rs")
        .map(|rs| rs.trim_matches('/'))
        .unwrap_or(DEFAULT_ROOT_PATH)
        .to_owned();

    Ok(ServiceEndpoint {
        name,
        instance_name: instance.clone(),
        uuid: txt_value(&txt, "uuid"),
        ipv4,
        ipv6,
        host: Some(host.to_owned()),
        port,
        tls: kind.is_tls(),
        root_path,
        admin_url: txt_value(&txt, "adminurl"),
        icon_url: txt_value(&txt, "representation"),
        mime_types: txt_list(&txt, "pdl"),
        color_options: txt_list(&txt, "cs"),
        input_sources: txt_list(&txt, "is"),
        duplex_supported: txt
            .get("duplex")
            .is_some_and(|v| v.eq_ignore_ascii_case("t")),
        txt_version: txt_value(&txt, "txtvers"),
        escl_version: txt_value(&txt, "vers"),
        note: txt_value(&txt, "note"),
    })
}

fn txt_value(txt: &HashMap<String, String>, key: &str) -> Option<String> {
    txt.get(key).filter(|v| !v.is_empty()).cloned()
}

fn txt_list(txt: &HashMap<String, String>, key: &str) -> Vec<String> {
    txt.get(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Deduplication and callback dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    name: String,
    uuid: Option<String>,
    port: u16,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
}

impl DeviceKey {
    fn of(endpoint: &ServiceEndpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            uuid: endpoint.uuid.clone(),
            port: endpoint.port,
            ipv4: endpoint.ipv4,
            ipv6: endpoint.ipv6,
        }
    }
}

#[derive(Default)]
struct SeenDevices {
    keys: HashSet<DeviceKey>,
    /// (name, uuid) of devices already reported over HTTPS.
    tls: HashSet<(String, Option<String>)>,
}

type Callback = Box<dyn Fn(ServiceEndpoint) + Send + Sync>;

/// Shared between the public handle, the re-query thread and the event
/// forwarder threads.
struct Dispatcher {
    seen: Mutex<SeenDevices>,
    callback: Callback,
    stopped: AtomicBool,
    /// Held for reading while the callback runs; `stop` takes it for
    /// writing, so it returns only once no callback is in flight.
    gate: RwLock<()>,
    live_forwarders: AtomicUsize,
    browse_rounds: AtomicUsize,
}

impl Dispatcher {
    fn new(callback: Callback) -> Self {
        Self {
            seen: Mutex::new(SeenDevices::default()),
            callback,
            stopped: AtomicBool::new(false),
            gate: RwLock::new(()),
            live_forwarders: AtomicUsize::new(0),
            browse_rounds: AtomicUsize::new(0),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        let _gate = self.gate.write().expect("discovery gate lock poisoned");
        self.stopped.store(true, Ordering::Release);
    }

    fn live_forwarders(&self) -> usize {
        self.live_forwarders.load(Ordering::Acquire)
    }

    fn browse_rounds(&self) -> usize {
        self.browse_rounds.load(Ordering::Acquire)
    }

    fn handle(&self, advertisement: &Advertisement) {
        if self.is_stopped() {
            return;
        }
        let endpoint = match parse_advertisement(advertisement) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                debug!(instance = %advertisement.instance_name, error = %e, "ignoring advertisement");
                return;
            }
        };
        if !self.admit(&endpoint) {
            trace!(name = %endpoint.name, port = endpoint.port, "duplicate advertisement");
            return;
        }
        let _gate = self.gate.read().expect("discovery gate lock poisoned");
        if self.is_stopped() {
            return;
        }
        info!(
            name = %endpoint.name,
            host = ?endpoint.host,
            port = endpoint.port,
            tls = endpoint.tls,
            "scanner discovered"
        );
        (self.callback)(endpoint);
    }

    /// Record the endpoint and report whether it is new.
    fn admit(&self, endpoint: &ServiceEndpoint) -> bool {
        let identity = (endpoint.name.clone(), endpoint.uuid.clone());
        let mut seen = self.seen.lock().expect("discovery state lock poisoned");
        if !endpoint.tls && seen.tls.contains(&identity) {
            return false;
        }
        if !seen.keys.insert(DeviceKey::of(endpoint)) {
            return false;
        }
        if endpoint.tls {
            seen.tls.insert(identity);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Discovery engine
// ---------------------------------------------------------------------------

/// Scanner discovery engine using mDNS-SD.
///
/// The callback runs on a background thread, once per unique device.  It is
/// never invoked after [`shutdown`](Self::shutdown) returns or the engine is
/// dropped: shutdown waits for a callback already in progress.  The callback
/// must therefore not shut down or drop its own engine.
pub struct ScannerDiscovery {
    config: DiscoveryConfig,
    daemon: Option<ServiceDaemon>,
    dispatcher: Arc<Dispatcher>,
    requery: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
    started: bool,
}

impl ScannerDiscovery {
    /// Create a discovery engine.
    ///
    /// This spawns the mDNS daemon thread but does not query yet; call
    /// [`start`](Self::start).
    pub fn new<F>(config: DiscoveryConfig, callback: F) -> Result<Self>
    where
        F: Fn(ServiceEndpoint) + Send + Sync + 'static,
    {
        let daemon = ServiceDaemon::new()
            .map_err(|e| ScanwerkError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            config,
            daemon: Some(daemon),
            dispatcher: Arc::new(Dispatcher::new(Box::new(callback))),
            requery: None,
            started: false,
        })
    }

    /// Query for scanners now and keep re-querying in the background.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(ScanwerkError::AlreadyStarted);
        }
        let daemon = self
            .daemon
            .clone()
            .ok_or_else(|| ScanwerkError::Discovery("discovery has been shut down".into()))?;

        browse_all(&daemon, &self.dispatcher)?;

        let (stop_tx, stop_rx) = mpsc::channel();
        let dispatcher = Arc::clone(&self.dispatcher);
        let initial_delay = self.config.initial_requery_delay;
        let handle = std::thread::Builder::new()
            .name("escl-requery".into())
            .spawn(move || requery_loop(&daemon, &dispatcher, &stop_rx, initial_delay))?;

        self.requery = Some((stop_tx, handle));
        self.started = true;
        info!("mDNS scanner discovery started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Stop querying and shut the mDNS daemon down.
    pub fn shutdown(mut self) -> Result<()> {
        self.dispose()
    }

    fn dispose(&mut self) -> Result<()> {
        self.dispatcher.stop();
        if let Some((stop_tx, handle)) = self.requery.take() {
            // The loop exits on either a message or a disconnected channel.
            let _ = stop_tx.send(());
            if handle.join().is_err() {
                warn!("re-query thread panicked");
            }
        }
        if let Some(daemon) = self.daemon.take() {
            daemon
                .shutdown()
                .map_err(|e| ScanwerkError::Discovery(format!("daemon shutdown: {e}")))?;
            info!("mDNS scanner discovery shut down");
        }
        Ok(())
    }

    /// Browse for `duration`, then shut down and return every scanner found.
    pub fn browse_for(config: DiscoveryConfig, duration: Duration) -> Result<Vec<ServiceEndpoint>> {
        let found = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&found);
        let mut discovery = Self::new(config, move |endpoint| {
            sink.lock()
                .expect("endpoint list lock poisoned")
                .push(endpoint);
        })?;
        discovery.start()?;
        std::thread::sleep(duration);
        discovery.shutdown()?;

        let endpoints = std::mem::take(&mut *found.lock().expect("endpoint list lock poisoned"));
        Ok(endpoints)
    }
}

impl Drop for ScannerDiscovery {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            debug!(error = %e, "error while disposing scanner discovery");
        }
    }
}

/// Issue a browse for both service types.  Each browse gets its own
/// receiver, drained by a forwarder thread until the daemon stops or
/// closes it.
///
/// A browse still running for the same type is stopped first.  That ends
/// its retransmissions and sends `SearchStopped` to its forwarder, so only
/// one forwarder per type is alive at a time.
fn browse_all(daemon: &ServiceDaemon, dispatcher: &Arc<Dispatcher>) -> Result<()> {
    for kind in ServiceKind::ALL {
        if dispatcher.browse_rounds() > 0 {
            if let Err(e) = daemon.stop_browse(kind.service_type()) {
                debug!(service_type = kind.service_type(), error = %e, "stop_browse failed");
            }
        }
        let receiver = daemon.browse(kind.service_type()).map_err(|e| {
            ScanwerkError::Discovery(format!("browse {}: {e}", kind.service_type()))
        })?;
        spawn_forwarder(kind, receiver, Arc::clone(dispatcher))?;
    }
    dispatcher.browse_rounds.fetch_add(1, Ordering::AcqRel);
    Ok(())
}

fn spawn_forwarder(
    kind: ServiceKind,
    receiver: mdns_sd::Receiver<ServiceEvent>,
    dispatcher: Arc<Dispatcher>,
) -> Result<()> {
    dispatcher.live_forwarders.fetch_add(1, Ordering::AcqRel);
    let counter = Arc::clone(&dispatcher);
    let spawned = std::thread::Builder::new()
        .name(format!("mdns-{}", kind.service_type()))
        .spawn(move || {
            while let Ok(event) = receiver.recv() {
                if dispatcher.is_stopped() {
                    break;
                }
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        dispatcher.handle(&Advertisement::from_service_info(&info, kind));
                    }
                    ServiceEvent::SearchStopped(service_type) => {
                        debug!(service_type = %service_type, "mDNS search stopped");
                        break;
                    }
                    other => {
                        trace!(service_type = kind.service_type(), event = ?other, "mDNS event");
                    }
                }
            }
            dispatcher.live_forwarders.fetch_sub(1, Ordering::AcqRel);
        });
    if let Err(e) = spawned {
        counter.live_forwarders.fetch_sub(1, Ordering::AcqRel);
        return Err(e.into());
    }
    Ok(())
}

/// Re-query delays: `initial`, then doubling, saturating at `Duration::MAX`.
fn requery_delays(initial: Duration) -> impl Iterator<Item = Duration> {
    std::iter::successors(Some(initial), |delay| Some(delay.saturating_mul(2)))
}

fn requery_loop(
    daemon: &ServiceDaemon,
    dispatcher: &Arc<Dispatcher>,
    stop: &mpsc::Receiver<()>,
    initial_delay: Duration,
) {
    for delay in requery_delays(initial_delay) {
        match stop.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if dispatcher.is_stopped() {
            break;
        }
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            round = dispatcher.browse_rounds(),
            "re-querying for scanners"
        );
        if let Err(e) = browse_all(daemon, dispatcher) {
            warn!(error = %e, "scanner re-query failed");
        }
    }
}
