//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use asyncweb::client::{ClientError, ClientResult, Connector, Pool, RawResponse, RequestOptions};
use asyncweb::config::ClientConfig;

/// Reply produced by a stub backend.
#[derive(Debug, Clone)]
pub struct StubReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl StubReply {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            content_type: "application/json",
            ..Self::text(status, body)
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Start a programmable raw HTTP/1.1 backend on an ephemeral port.
///
/// `f` receives the raw request head and produces the reply.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StubReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let _ = serve_one(socket, f.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that always answers with the same reply.
pub async fn start_mock_backend(reply: StubReply) -> SocketAddr {
    start_programmable_backend(move |_| {
        let reply = reply.clone();
        async move { reply }
    })
    .await
}

async fn serve_one<F, Fut>(mut socket: TcpStream, f: &F) -> std::io::Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = StubReply>,
{
    let head = read_request(&mut socket).await?;
    let reply = f(head).await;

    let reason = match reply.status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reason,
        reply.content_type,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Read the request head and drain the body so the client never sees a reset.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }
    Ok(head)
}

/// Counters shared between a `CountingConnector` and the test.
#[derive(Debug, Default)]
pub struct Stats {
    pub connects: AtomicUsize,
    pub requests: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Stats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory connector that counts pool construction and teardown.
pub struct CountingConnector {
    pub stats: Arc<Stats>,
    pub connect_delay: Duration,
    pub request_delay: Duration,
    pub close_delay: Duration,
    /// Number of upcoming `connect` calls that fail.
    pub failures: AtomicUsize,
    pub content_type: &'static str,
    pub body: &'static str,
}

impl CountingConnector {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            stats,
            connect_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            failures: AtomicUsize::new(0),
            content_type: "text/plain",
            body: "OK",
        }
    }
}

impl Connector for CountingConnector {
    type Pool = FakePool;

    async fn connect(&self, _config: &ClientConfig) -> ClientResult<FakePool> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ClientError::PoolConstruction("connector refused".into()));
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakePool {
            stats: self.stats.clone(),
            request_delay: self.request_delay,
            close_delay: self.close_delay,
            content_type: self.content_type,
            body: self.body,
            closed: AtomicBool::new(false),
        })
    }
}

/// Pool answering every request with a canned body.
pub struct FakePool {
    stats: Arc<Stats>,
    request_delay: Duration,
    close_delay: Duration,
    content_type: &'static str,
    body: &'static str,
    closed: AtomicBool,
}

impl Pool for FakePool {
    async fn request(&self, method: Method, _url: Url, _options: RequestOptions) -> ClientResult<RawResponse> {
        if self.is_closed() {
            return Err(ClientError::PoolClosed);
        }
        self.stats.requests.fetch_add(1, Ordering::SeqCst);
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        Ok(RawResponse {
            status: 200,
            method,
            headers,
            body: Bytes::from_static(self.body.as_bytes()),
        })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Client config with short timeouts for tests.
pub fn client_config(request_timeout_secs: f64, idle_session_timeout_secs: f64) -> ClientConfig {
    ClientConfig {
        request_timeout_secs,
        idle_session_timeout_secs,
        ..ClientConfig::default()
    }
}
