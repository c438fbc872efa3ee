// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async eSCL client for communicating with network scanners.
//
// Uses `reqwest` to issue the eSCL HTTP operations, relative to
// `{scheme}://{host}:{port}/{root}/`:
//   - GET    ScannerCapabilities
//   - GET    ScannerStatus
//   - POST   ScanJobs                 (returns the job in `Location`)
//   - GET    {job}/NextDocument       (404 = done, 410 = canceled)
//   - GET    {job}/Progress           (optional, one number per line)
//   - GET    {job}/ErrorDetails
//   - DELETE {job}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{CONTENT_LOCATION, CONTENT_TYPE, HeaderName, LOCATION};
use reqwest::{Method, Response, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use scanwerk_core::config::ClientConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{Capabilities, RawDocument, ScanSettings, ScannerStatus, ServiceEndpoint};

use crate::capabilities::parse_capabilities;
use crate::job::EsclJob;
use crate::status::parse_status;
use crate::xml;

/// How many times in a row a scanner may re-send the previous page before
/// the fetch is abandoned.
const MAX_REPEAT_DELIVERIES: usize = 3;

/// Upper bound for pre-allocating a document buffer from `Content-Length`.
const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

/// Receives page progress as a fraction, usually between 0.0 and 1.0.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Per-call options for [`EsclClient::next_document_with`].
#[derive(Default)]
pub struct FetchOptions {
    /// Stream page progress from the scanner while waiting for the page.
    pub progress: Option<ProgressCallback>,
    /// Bound the wait for response headers by `request_timeout` instead of
    /// `document_timeout`.
    pub short_timeout: bool,
}

impl FetchOptions {
    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(on_progress));
        self
    }

    pub fn short_timeout(mut self) -> Self {
        self.short_timeout = true;
        self
    }
}

/// Background progress reader, aborted on drop.
struct ProgressTask(tokio::task::JoinHandle<()>);

impl Drop for ProgressTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Splits a progress stream into one number per line.
#[derive(Default)]
struct ProgressLines {
    pending: Vec<u8>,
}

impl ProgressLines {
    fn feed(&mut self, chunk: &[u8]) -> Vec<f64> {
        self.pending.extend_from_slice(chunk);
        let mut fractions = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            let parsed = std::str::from_utf8(&line)
                .ok()
                .and_then(|text| text.trim().parse::<f64>().ok());
            if let Some(fraction) = parsed {
                fractions.push(fraction);
            }
        }
        fractions
    }
}

/// Async eSCL client bound to a single scanner endpoint.
///
/// One connection pool is shared by every call, so the page fetches of a
/// multi-page job reuse connections.  All methods require a Tokio runtime.
pub struct EsclClient {
    endpoint: ServiceEndpoint,
    config: ClientConfig,
    http: reqwest::Client,
    /// Set once an HTTPS handshake has failed and plaintext is used instead.
    http_fallback: AtomicBool,
}

impl EsclClient {
    /// Create a client with default timeouts and security policy.
    pub fn new(endpoint: ServiceEndpoint) -> Result<Self> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    pub fn with_config(endpoint: ServiceEndpoint, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            // eSCL certificates are self-signed; encrypt without
            // authenticating unless the policy asks for trusted certs.
            .danger_accept_invalid_certs(!config.security.require_trusted_certificate)
            .build()
            .map_err(|e| ScanwerkError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint,
            config,
            http,
            http_fallback: AtomicBool::new(false),
        })
    }

    /// The scanner this client talks to.
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Whether requests currently go over HTTPS.
    pub fn uses_tls(&self) -> bool {
        (self.endpoint.tls || self.endpoint.port == 443)
            && !self.http_fallback.load(Ordering::Relaxed)
            && !self.config.security.disable_https
    }

    /// Fetch and parse the scanner's capability document.
    #[instrument(skip(self), fields(scanner = %self.endpoint.name))]
    pub async fn get_capabilities(&self) -> Result<Capabilities> {
        let text = self
            .get_text(&self.resource_path("ScannerCapabilities"), "GET ScannerCapabilities")
            .await?;
        parse_capabilities(&text)
    }

    /// Fetch the scanner and feeder state.
    #[instrument(skip(self), fields(scanner = %self.endpoint.name))]
    pub async fn get_status(&self) -> Result<ScannerStatus> {
        let text = self
            .get_text(&self.resource_path("ScannerStatus"), "GET ScannerStatus")
            .await?;
        parse_status(&text)
    }

    /// Submit a scan job.
    ///
    /// Returns the job handle taken from the response's `Location` header.
    #[instrument(
        skip(self, settings),
        fields(
            scanner = %self.endpoint.name,
            source = settings.input_source.as_wire(),
            color = settings.color_mode.as_wire(),
        )
    )]
    pub async fn create_scan_job(&self, settings: &ScanSettings) -> Result<EsclJob> {
        const OPERATION: &str = "POST ScanJobs";

        let body = xml::scan_settings_document(settings)?;
        let response = self
            .send(
                Method::POST,
                &self.resource_path("ScanJobs"),
                Some(&body),
                Some(self.config.request_timeout),
                OPERATION,
            )
            .await?;
        let response = check_status(response, OPERATION)?;

        let location = header_string(&response, LOCATION).ok_or_else(|| {
            ScanwerkError::Protocol(format!("{OPERATION} response has no Location header"))
        })?;
        let job = EsclJob::new(resolve_job_path(response.url(), &location)?);

        info!(job = %job, "scan job created");
        Ok(job)
    }

    /// Fetch the next page of a job.
    ///
    /// Returns `Ok(None)` once the scanner reports the job complete (404) or
    /// canceled (410); every later call for the same job also returns
    /// `Ok(None)` without contacting the scanner.
    pub async fn next_document(&self, job: &mut EsclJob) -> Result<Option<RawDocument>> {
        self.next_document_with(job, FetchOptions::default()).await
    }

    /// Fetch the next page of a job, with page progress reporting or a short
    /// header timeout.
    ///
    /// Progress comes from the `{job}/Progress` extension and is best
    /// effort: a scanner without it still delivers the page.
    #[instrument(
        skip(self, job, options),
        fields(
            scanner = %self.endpoint.name,
            job = %job,
            progress = options.progress.is_some(),
            short_timeout = options.short_timeout,
        )
    )]
    pub async fn next_document_with(
        &self,
        job: &mut EsclJob,
        options: FetchOptions,
    ) -> Result<Option<RawDocument>> {
        const OPERATION: &str = "GET NextDocument";

        if job.is_finished() {
            debug!(phase = ?job.phase(), "job already finished");
            return Ok(None);
        }

        // Aborted when this call returns, whatever the outcome.
        let _progress = match options.progress {
            Some(on_progress) => self.watch_progress(job, on_progress).await,
            None => None,
        };
        let header_timeout = if options.short_timeout {
            self.config.request_timeout
        } else {
            self.config.document_timeout
        };

        let path = format!("{}/NextDocument", job.uri_path());
        for _ in 0..=MAX_REPEAT_DELIVERIES {
            // The scanner may hold the response until the page is scanned,
            // so the wait for headers gets its own, longer deadline and the
            // body is read chunk by chunk as it arrives.
            let response = tokio::time::timeout(
                header_timeout,
                self.send(Method::GET, &path, None, None, OPERATION),
            )
            .await
            .map_err(|_| {
                ScanwerkError::Timeout(format!(
                    "{OPERATION}: no response within {header_timeout:?}"
                ))
            })??;

            match response.status() {
                StatusCode::NOT_FOUND => {
                    debug!("scan complete");
                    job.mark_exhausted();
                    return Ok(None);
                }
                StatusCode::GONE => {
                    info!("scan job was canceled");
                    job.mark_canceled();
                    return Ok(None);
                }
                _ => {}
            }
            let response = check_status(response, OPERATION)?;

            let content_type = header_string(&response, CONTENT_TYPE).map(|ct| media_type(&ct));
            let content_location = header_string(&response, CONTENT_LOCATION);
            let data = self.read_body(response, OPERATION).await?;
            if data.is_empty() {
                return Err(ScanwerkError::Transport(format!(
                    "{OPERATION}: response had no data, the connection may have been interrupted"
                )));
            }

            if job.is_repeat_delivery(content_location.as_deref()) {
                warn!(location = ?content_location, "scanner re-delivered the previous document");
                continue;
            }

            job.mark_fetching(content_location.as_deref());
            debug!(
                content_type = ?content_type,
                bytes = data.len(),
                location = ?content_location,
                "document received"
            );
            return Ok(Some(RawDocument {
                data,
                content_type,
                content_location,
            }));
        }

        Err(ScanwerkError::Protocol(format!(
            "{OPERATION}: scanner kept re-sending the same document"
        )))
    }

    /// Ask the scanner to cancel a job.
    ///
    /// Best effort: failures are logged and reported as `false`, never as an
    /// error.  The handle is marked canceled either way.
    #[instrument(skip(self, job), fields(scanner = %self.endpoint.name, job = %job))]
    pub async fn cancel_job(&self, job: &mut EsclJob) -> bool {
        if job.is_finished() {
            debug!(phase = ?job.phase(), "job already finished; nothing to cancel");
            return true;
        }

        let result = self
            .send(
                Method::DELETE,
                job.uri_path(),
                None,
                Some(self.config.request_timeout),
                "DELETE ScanJob",
            )
            .await;
        job.mark_canceled();

        match result {
            Ok(response) if response.status().is_success() => {
                info!("scan job canceled");
                true
            }
            Ok(response) => {
                warn!(status = response.status().as_u16(), "scanner rejected cancel request");
                false
            }
            Err(e) => {
                warn!(error = %e, "cancel request failed");
                false
            }
        }
    }

    /// Fetch the scanner's description of why a job failed.
    #[instrument(skip(self, job), fields(scanner = %self.endpoint.name, job = %job))]
    pub async fn error_details(&self, job: &EsclJob) -> Result<String> {
        self.get_text(&format!("{}/ErrorDetails", job.uri_path()), "GET ErrorDetails")
            .await
    }

    // -- internal helpers ---------------------------------------------------

    /// `/{root}/{resource}`, or `/{resource}` when the root is empty.
    fn resource_path(&self, resource: &str) -> String {
        let root = self.endpoint.root_path.trim_matches('/');
        if root.is_empty() {
            format!("/{resource}")
        } else {
            format!("/{root}/{resource}")
        }
    }

    /// `host:port`, using the mDNS hostname when preferred and available,
    /// otherwise the preferred IP address.
    fn authority(&self) -> Result<String> {
        let port = self.endpoint.port;
        if self.config.prefer_hostname {
            let host = self
                .endpoint
                .host
                .as_deref()
                .map(|h| h.trim_end_matches('.'))
                .filter(|h| !h.is_empty());
            if let Some(host) = host {
                return Ok(format!("{host}:{port}"));
            }
        }
        let ip = self.endpoint.address().ok_or_else(|| {
            ScanwerkError::Protocol(format!(
                "scanner '{}' has neither a hostname nor an address",
                self.endpoint.name
            ))
        })?;
        Ok(SocketAddr::new(ip, port).to_string())
    }

    fn url(&self, path: &str) -> Result<String> {
        let tls = self.uses_tls();
        if self.config.security.require_https && !tls {
            return Err(ScanwerkError::SecurityPolicy(format!(
                "plain HTTP to '{}' is not allowed",
                self.endpoint.name
            )));
        }
        let scheme = if tls { "https" } else { "http" };
        Ok(format!("{scheme}://{}{path}", self.authority()?))
    }

    /// Open `{job}/Progress` and forward each reported fraction to
    /// `on_progress` from a background task.  Returns `None` when the scanner
    /// does not offer progress.
    async fn watch_progress(
        &self,
        job: &EsclJob,
        on_progress: ProgressCallback,
    ) -> Option<ProgressTask> {
        const OPERATION: &str = "GET Progress";

        let path = format!("{}/Progress", job.uri_path());
        let response = match tokio::time::timeout(
            self.config.request_timeout,
            self.send(Method::GET, &path, None, None, OPERATION),
        )
        .await
        {
            Ok(Ok(response)) if response.status().is_success() => response,
            Ok(Ok(response)) => {
                debug!(status = response.status().as_u16(), "page progress not available");
                return None;
            }
            Ok(Err(e)) => {
                debug!(error = %e, "page progress not available");
                return None;
            }
            Err(_) => {
                debug!("page progress request timed out");
                return None;
            }
        };

        let task = tokio::spawn(async move {
            let mut response = response;
            let mut lines = ProgressLines::default();
            while let Ok(Some(chunk)) = response.chunk().await {
                for fraction in lines.feed(&chunk) {
                    on_progress(fraction);
                }
            }
        });
        Some(ProgressTask(task))
    }

    async fn get_text(&self, path: &str, operation: &'static str) -> Result<String> {
        let response = self
            .send(Method::GET, path, None, Some(self.config.request_timeout), operation)
            .await?;
        let response = check_status(response, operation)?;
        response
            .text()
            .await
            .map_err(|e| transport_error(operation, e))
    }

    /// Send a request, switching to plaintext HTTP once if the HTTPS
    /// handshake fails and the policy allows it.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
        timeout: Option<Duration>,
        operation: &'static str,
    ) -> Result<Response> {
        let url = self.url(path)?;
        match self.send_once(&method, &url, body, timeout).await {
            Err(e) if self.should_fall_back(&url, &e) => {
                warn!(url = %url, error = %e, "TLS handshake failed, falling back to HTTP");
                self.http_fallback.store(true, Ordering::Relaxed);
                let url = self.url(path)?;
                self.send_once(&method, &url, body, timeout)
                    .await
                    .map_err(|e| transport_error(operation, e))
            }
            result => result.map_err(|e| transport_error(operation, e)),
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&str>,
        timeout: Option<Duration>,
    ) -> reqwest::Result<Response> {
        debug!(method = %method, url = %url, "eSCL request");
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .body(body.to_owned());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        debug!(status = response.status().as_u16(), "eSCL response");
        Ok(response)
    }

    fn should_fall_back(&self, url: &str, err: &reqwest::Error) -> bool {
        self.config.security.allows_http_fallback()
            && !self.http_fallback.load(Ordering::Relaxed)
            && url.starts_with("https://")
            && is_tls_failure(err)
    }

    /// Read a response body chunk by chunk, failing if the scanner stalls
    /// for longer than the configured read timeout.
    async fn read_body(&self, mut response: Response, operation: &'static str) -> Result<Vec<u8>> {
        let capacity = response
            .content_length()
            .unwrap_or(0)
            .min(MAX_PREALLOC_BYTES);
        let mut data = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
        loop {
            let chunk = tokio::time::timeout(self.config.read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    ScanwerkError::Timeout(format!(
                        "{operation}: no data for {:?} after {} bytes",
                        self.config.read_timeout,
                        data.len()
                    ))
                })?
                .map_err(|e| transport_error(operation, e))?;
            match chunk {
                Some(bytes) => data.extend_from_slice(&bytes),
                None => break,
            }
        }
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn check_status(response: Response, operation: &'static str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        warn!(status = status.as_u16(), operation, "eSCL request failed");
        Err(ScanwerkError::Http {
            operation,
            status: status.as_u16(),
        })
    }
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> ScanwerkError {
    if err.is_timeout() {
        ScanwerkError::Timeout(format!("{operation}: {err}"))
    } else {
        ScanwerkError::Transport(format!("{operation}: {err}"))
    }
}

fn header_string(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Strip parameters from a content type: `image/jpeg; q=1` → `image/jpeg`.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_owned()
}

/// Resolve a `Location` header (absolute or relative) against the request
/// URL and keep only the path, so later calls go to the same host the
/// client was configured with.
fn resolve_job_path(request_url: &Url, location: &str) -> Result<String> {
    let resolved = request_url.join(location).map_err(|e| {
        ScanwerkError::Protocol(format!("invalid Location header '{location}': {e}"))
    })?;
    Ok(resolved.path().to_owned())
}

/// Whether a request failed because of the TLS handshake (as opposed to the
/// host being unreachable).
fn is_tls_failure(err: &reqwest::Error) -> bool {
    chain_contains_tls_error(err)
}

/// Walk an error chain looking for a `rustls::Error`.
///
/// I/O errors hide their payload from `source()`, and the connector nests
/// them (`Other` around `InvalidData` around the TLS error), so each
/// `io::Error` is unwrapped through `get_ref()` instead.
fn chain_contains_tls_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        current = match e.downcast_ref::<std::io::Error>() {
            Some(io) => io
                .get_ref()
                .map(|inner| inner as &(dyn std::error::Error + 'static))
                .or_else(|| std::error::Error::source(io)),
            None => e.source(),
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::config::SecurityPolicy;

    fn endpoint(addr: &str, tls: bool) -> ServiceEndpoint {
        ServiceEndpoint::from_address(addr.parse().unwrap(), "eSCL", tls)
    }

    #[test]
    fn url_uses_ip_when_no_hostname() {
        let client = EsclClient::new(endpoint("192.168.1.50:8080", false)).unwrap();
        assert_eq!(
            client.url(&client.resource_path("ScannerStatus")).unwrap(),
            "http://192.168.1.50:8080/eSCL/ScannerStatus"
        );
    }

    #[test]
    fn url_prefers_hostname() {
        let mut ep = endpoint("192.168.1.50:443", true);
        ep.host = Some("scanner.local.".into());
        let client = EsclClient::new(ep).unwrap();
        assert!(client.uses_tls());
        assert_eq!(
            client.url("/eSCL/ScanJobs").unwrap(),
            "https://scanner.local:443/eSCL/ScanJobs"
        );
    }

    #[test]
    fn hostname_preference_can_be_disabled() {
        let mut ep = endpoint("[fe80::1]:80", false);
        ep.host = Some("scanner.local.".into());
        let config = ClientConfig {
            prefer_hostname: false,
            ..Default::default()
        };
        let client = EsclClient::with_config(ep, config).unwrap();
        assert_eq!(client.url("/x").unwrap(), "http://[fe80::1]:80/x");
    }

    #[test]
    fn port_443_implies_tls() {
        let client = EsclClient::new(endpoint("10.0.0.2:443", false)).unwrap();
        assert!(client.uses_tls());
    }

    #[test]
    fn disable_https_overrides_tls_endpoint() {
        let config = ClientConfig {
            security: SecurityPolicy {
                disable_https: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = EsclClient::with_config(endpoint("10.0.0.2:8443", true), config).unwrap();
        assert!(!client.uses_tls());
        assert!(client.url("/x").unwrap().starts_with("http://"));
    }

    #[test]
    fn require_https_rejects_plaintext_endpoint() {
        let config = ClientConfig {
            security: SecurityPolicy {
                require_https: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = EsclClient::with_config(endpoint("10.0.0.2:80", false), config).unwrap();
        assert!(matches!(
            client.url("/x"),
            Err(ScanwerkError::SecurityPolicy(_))
        ));
    }

    #[test]
    fn empty_root_path_is_not_doubled() {
        let ep = ServiceEndpoint::from_address("10.0.0.2:80".parse().unwrap(), "", false);
        let client = EsclClient::new(ep).unwrap();
        assert_eq!(client.resource_path("ScanJobs"), "/ScanJobs");
    }

    #[test]
    fn job_path_resolution() {
        let base = Url::parse("http://10.0.0.2:80/eSCL/ScanJobs").unwrap();
        assert_eq!(
            resolve_job_path(&base, "http://other-host:8080/eSCL/ScanJobs/7").unwrap(),
            "/eSCL/ScanJobs/7"
        );
        assert_eq!(
            resolve_job_path(&base, "/eSCL/ScanJobs/8").unwrap(),
            "/eSCL/ScanJobs/8"
        );
        assert_eq!(
            resolve_job_path(&base, "ScanJobs/9").unwrap(),
            "/eSCL/ScanJobs/9"
        );
    }

    #[test]
    fn nested_io_errors_are_searched_for_tls_failures() {
        let tls = rustls::Error::General("handshake".into());
        let invalid_data = std::io::Error::new(std::io::ErrorKind::InvalidData, tls);
        let connector = std::io::Error::new(std::io::ErrorKind::Other, invalid_data);
        assert!(chain_contains_tls_error(&connector));

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!chain_contains_tls_error(&refused));
        let wrapped = std::io::Error::new(std::io::ErrorKind::Other, refused);
        assert!(!chain_contains_tls_error(&wrapped));
    }

    #[test]
    fn progress_lines_split_across_chunks() {
        let mut lines = ProgressLines::default();
        assert_eq!(lines.feed(b"0.25\n0."), vec![0.25]);
        assert_eq!(lines.feed(b"5\r\nnot a number\n"), vec![0.5]);
        assert!(lines.feed(b"1").is_empty());
        assert_eq!(lines.feed(b"\n"), vec![1.0]);
    }

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("image/jpeg"), "image/jpeg");
        assert_eq!(media_type("application/pdf; charset=binary"), "application/pdf");
    }
}
