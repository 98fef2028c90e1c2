//! Pooled HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! WebClient::get / post / ...
//!     → request() (method + URL validation)
//!     → session.rs (ensure_open: reuse, wait for, or build the pool and
//!       stamp the last-request time under the same lock)
//!     → transport.rs (Pool::request under the request timeout)
//!     → response.rs (text, optional JSON, flattened headers)
//!     → ClientResponse
//!
//! Background:
//!     session.rs idle watchdog → close pool after idle_session_timeout
//! ```
//!
//! # Design Decisions
//! - The pool is created lazily and recycled after inactivity
//! - At most one pool exists; concurrent first requests share it
//! - Transport errors and timeouts propagate unchanged, never retried here

pub mod error;
pub mod options;
pub mod response;
pub mod session;
pub mod transport;

use reqwest::Method;
use tokio::time;
use url::Url;

use crate::config::ClientConfig;

pub use error::{ClientError, ClientResult};
pub use options::{RequestBody, RequestOptions};
pub use response::{ClientResponse, RawResponse};
pub use session::{SessionManager, SessionPhase};
pub use transport::{Connector, Pool, ReqwestConnector, ReqwestPool};

/// Simple web client with a self-managing session.
///
/// ```no_run
/// # async fn demo() -> Result<(), asyncweb::client::ClientError> {
/// use asyncweb::client::{RequestOptions, WebClient};
///
/// let client = WebClient::default();
/// let response = client.get("http://localhost:8080/health", RequestOptions::new()).await?;
/// assert_eq!(response.status(), 200);
/// client.close(false).await;
/// # Ok(())
/// # }
/// ```
pub struct WebClient<C: Connector = ReqwestConnector> {
    session: SessionManager<C>,
}

impl WebClient {
    /// Create a client backed by `reqwest`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, ReqwestConnector)
    }
}

impl Default for WebClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl<C: Connector> WebClient<C> {
    /// Create a client that builds its pools with `connector`.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self {
            session: SessionManager::new(connector, config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.session.config()
    }

    /// Return true while a connection pool is alive.
    pub fn is_session_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Issue one request and normalize the response.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> ClientResult<ClientResponse> {
        let method = parse_method(method)?;
        let url = Url::parse(url).map_err(|source| ClientError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        // Counts as activity even if the request then fails
        let pool = self.session.ensure_open().await?;

        let timeout = self.config().request_timeout();
        tracing::trace!(method = %method, url = %url, "Sending request");
        let raw = match time::timeout(timeout, pool.request(method, url, options)).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout(timeout)),
        };

        ClientResponse::from_raw(raw)
    }

    /// GET request.
    pub async fn get(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("GET", url, options).await
    }

    /// HEAD request.
    pub async fn head(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("HEAD", url, options).await
    }

    /// OPTIONS request.
    pub async fn options(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("OPTIONS", url, options).await
    }

    /// TRACE request.
    pub async fn trace(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("TRACE", url, options).await
    }

    /// PATCH request.
    pub async fn patch(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("PATCH", url, options).await
    }

    /// POST request.
    pub async fn post(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("POST", url, options).await
    }

    /// PUT request.
    pub async fn put(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("PUT", url, options).await
    }

    /// DELETE request.
    pub async fn delete(&self, url: &str, options: RequestOptions) -> ClientResult<ClientResponse> {
        self.request("DELETE", url, options).await
    }

    /// Close the session and all active connections.
    ///
    /// The idle watchdog is cancelled unless `wait` is true.
    pub async fn close(&self, wait: bool) {
        self.session.close(wait).await;
    }
}

fn parse_method(method: &str) -> ClientResult<Method> {
    if method.is_empty() {
        return Err(ClientError::InvalidMethod(method.to_string()));
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| ClientError::InvalidMethod(method.to_string()))
}
