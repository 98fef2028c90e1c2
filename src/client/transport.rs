//! Connection pool abstraction and the reqwest-backed implementation.
//!
//! # Responsibilities
//! - Define the `Connector` / `Pool` seam the session manager drives
//! - Build a `reqwest::Client` from `ClientConfig`
//! - Enforce `connection_limit` and report closed pools
//!
//! # Design Decisions
//! - Keep-alive is disabled through `pool_max_idle_per_host(0)` when
//!   `force_close` is set
//! - The connection limit is a semaphore held for the whole exchange,
//!   body read included
//! - Closing drops the pooled client; in-flight requests keep their own
//!   handle and finish normally

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tokio::sync::Semaphore;
use url::Url;

use crate::client::error::{ClientError, ClientResult};
use crate::client::options::{RequestBody, RequestOptions};
use crate::client::response::RawResponse;
use crate::config::ClientConfig;

/// Builds connection pools.
pub trait Connector: Send + Sync + 'static {
    type Pool: Pool;

    /// Construct a new pool. Errors here are configuration errors.
    fn connect(&self, config: &ClientConfig) -> impl Future<Output = ClientResult<Self::Pool>> + Send;
}

/// A live set of reusable connections.
pub trait Pool: Send + Sync + 'static {
    /// Perform one exchange and buffer the whole body.
    fn request(
        &self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> impl Future<Output = ClientResult<RawResponse>> + Send;

    /// Release every connection. Calling it again is a no-op.
    fn close(&self) -> impl Future<Output = ()> + Send;

    fn is_closed(&self) -> bool;
}

/// Default connector producing `ReqwestPool`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestConnector;

impl Connector for ReqwestConnector {
    type Pool = ReqwestPool;

    async fn connect(&self, config: &ClientConfig) -> ClientResult<ReqwestPool> {
        if config.connection_limit == 0 || config.connection_limit > Semaphore::MAX_PERMITS {
            return Err(ClientError::PoolConstruction(format!(
                "connection_limit must be between 1 and {}",
                Semaphore::MAX_PERMITS
            )));
        }
        let timeout = config.request_timeout();
        let idle_per_host = if config.force_close { 0 } else { config.connection_limit };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(idle_per_host)
            .build()
            .map_err(|e| ClientError::PoolConstruction(e.to_string()))?;

        Ok(ReqwestPool {
            client: Mutex::new(Some(client)),
            permits: Semaphore::new(config.connection_limit),
            force_close: config.force_close,
            timeout,
        })
    }
}

/// Connection pool backed by a `reqwest::Client`.
#[derive(Debug)]
pub struct ReqwestPool {
    client: Mutex<Option<reqwest::Client>>,
    permits: Semaphore,
    force_close: bool,
    timeout: Duration,
}

impl ReqwestPool {
    fn client(&self) -> Option<reqwest::Client> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn map_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::transport(err)
        }
    }
}

impl Pool for ReqwestPool {
    async fn request(
        &self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> ClientResult<RawResponse> {
        // Held until the body has been read
        let _permit = self.permits.acquire().await.map_err(|_| ClientError::PoolClosed)?;
        let client = self.client().ok_or(ClientError::PoolClosed)?;

        let mut builder = client.request(method.clone(), url);
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(ClientError::transport)?;
            let value = HeaderValue::from_str(value).map_err(ClientError::transport)?;
            builder = builder.header(name, value);
        }
        if self.force_close {
            builder = builder.header(reqwest::header::CONNECTION, "close");
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        builder = match options.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(RawResponse {
            status,
            method,
            headers,
            body,
        })
    }

    async fn close(&self) {
        self.permits.close();
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner).take();
        if client.is_some() {
            tracing::debug!("Connection pool closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_new_requests() {
        let pool = ReqwestConnector.connect(&ClientConfig::default()).await.unwrap();
        assert!(!pool.is_closed());

        pool.close().await;
        pool.close().await;
        assert!(pool.is_closed());

        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = pool.request(Method::GET, url, RequestOptions::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::PoolClosed));
    }

    #[tokio::test]
    async fn oversized_connection_limit_is_a_construction_error() {
        let config = ClientConfig {
            connection_limit: usize::MAX,
            ..ClientConfig::default()
        };
        let err = ReqwestConnector.connect(&config).await.unwrap_err();
        assert!(matches!(err, ClientError::PoolConstruction(_)));
    }
}
