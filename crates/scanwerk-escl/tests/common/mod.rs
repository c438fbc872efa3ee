// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted in-process eSCL scanner for integration tests.
//
// Speaks just enough HTTP/1.1 to serve one request per connection: headers
// are read up to the blank line, the body by Content-Length, and every
// response closes the connection.  Unscripted requests get a 404.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use scanwerk_core::types::ServiceEndpoint;

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Send only this many body bytes, then hold the connection open.
    pub stall_after: Option<usize>,
    /// Wait this long before answering.
    pub delay: Option<Duration>,
}

impl StubResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            stall_after: None,
            delay: None,
        }
    }

    pub fn xml(text: &str) -> Self {
        Self::new(200)
            .header("Content-Type", "text/xml")
            .body(text)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stall_after(mut self, bytes: usize) -> Self {
        self.stall_after = Some(bytes);
        self
    }
}

/// A request as the stub received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// First byte of a TLS handshake record.
const TLS_HANDSHAKE: u8 = 0x16;

type Routes = Arc<Mutex<HashMap<(String, String), VecDeque<StubResponse>>>>;
type Requests = Arc<Mutex<Vec<RecordedRequest>>>;

pub struct StubScanner {
    addr: SocketAddr,
    routes: Routes,
    requests: Requests,
    task: JoinHandle<()>,
}

impl StubScanner {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();
        let requests: Requests = Arc::default();

        let task = {
            let routes = Arc::clone(&routes);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let _ = serve(stream, routes, requests).await;
                    });
                }
            })
        };

        Self {
            addr,
            routes,
            requests,
            task,
        }
    }

    /// Queue a response for the next `method path` request.
    pub fn respond(&self, method: &str, path: &str, response: StubResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry((method.to_owned(), path.to_owned()))
            .or_default()
            .push_back(response);
    }

    /// Plaintext endpoint with the usual `eSCL` root.
    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::from_address(self.addr, "eSCL", false)
    }

    /// The same scanner advertised as `_uscans`, although it only speaks
    /// plaintext HTTP.
    pub fn tls_endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint::from_address(self.addr, "eSCL", true)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Drop for StubScanner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: Routes, requests: Requests) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        // A TLS ClientHello: answer in plaintext like any HTTP-only server.
        if buf.first() == Some(&TLS_HANDSHAKE) {
            stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
                .await?;
            stream.shutdown().await?;
            return Ok(());
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_owned();
    let path = request_line.next().unwrap_or_default().to_owned();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (body_start + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).into_owned();

    requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        body,
    });

    let response = routes
        .lock()
        .unwrap()
        .get_mut(&(method, path))
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| StubResponse::new(404));

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));
    stream.write_all(head.as_bytes()).await?;

    match response.stall_after {
        Some(sent) => {
            stream
                .write_all(&response.body[..sent.min(response.body.len())])
                .await?;
            stream.flush().await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        None => {
            stream.write_all(&response.body).await?;
            stream.shutdown().await?;
        }
    }
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        410 => "Gone",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
