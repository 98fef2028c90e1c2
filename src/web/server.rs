//! Web service lifecycle.
//!
//! # Responsibilities
//! - Bind every configured site (TCP host:port pairs, unix sockets)
//! - Apply socket options (backlog, reuse address/port)
//! - Wire up middleware (request ID, access log, body limit)
//! - Serve each site on its own task with graceful shutdown
//! - Stop all sites within the shutdown timeout
//!
//! # Design Decisions
//! - Fail fast: a bind error aborts start before any site is served
//! - One shutdown broadcast drives every site
//! - Sites that do not drain in time are aborted

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::http::{HeaderName, Request};
use axum::Router;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

use crate::config::validation::{validate_service, ValidationError};
use crate::config::ServiceConfig;
use crate::lifecycle::Shutdown;
use crate::web::request::{MakeRequestUuidV4, X_REQUEST_ID};

/// Errors raised while starting the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid service configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error("failed to resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("service is already running")]
    AlreadyRunning,
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// A bound socket waiting to be served.
enum Bound {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, String),
}

/// A running site.
struct Site {
    name: String,
    local_addr: Option<SocketAddr>,
    task: JoinHandle<io::Result<()>>,
}

/// Web application service.
pub struct WebService {
    config: ServiceConfig,
    router: Router,
    shutdown: Shutdown,
    sites: Vec<Site>,
}

impl WebService {
    pub fn new(config: ServiceConfig, router: Router) -> Self {
        Self {
            config,
            router,
            shutdown: Shutdown::new(),
            sites: Vec::new(),
        }
    }

    /// Mount an additional route table under `prefix`.
    pub fn add_subapp(mut self, prefix: &str, routes: Router) -> Self {
        let router = std::mem::replace(&mut self.router, Router::new());
        self.router = router.nest(prefix, routes);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.sites.is_empty()
    }

    /// Addresses of the bound TCP sites (useful with port 0).
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sites.iter().filter_map(|s| s.local_addr).collect()
    }

    /// Bind every configured site and start serving.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        let errors = validate_service(&self.config);
        if !errors.is_empty() {
            return Err(ServiceError::InvalidConfig(errors));
        }

        tracing::debug!("Starting web service");
        // Bind everything first; nothing is served unless all binds succeed
        let bound = self.bind_all().await?;
        let app = self.build_app();

        for listener in bound {
            let graceful = self.shutdown.signal();

            let site = match listener {
                Bound::Tcp(listener) => {
                    let local_addr = listener.local_addr().ok();
                    let name = local_addr.map_or_else(|| "tcp".to_string(), |a| a.to_string());
                    let service = app.clone().into_make_service_with_connect_info::<SocketAddr>();
                    let task = tokio::spawn(async move {
                        axum::serve(listener, service)
                            .with_graceful_shutdown(graceful)
                            .await
                    });
                    Site { name, local_addr, task }
                }
                #[cfg(unix)]
                Bound::Unix(listener, path) => {
                    let service = app.clone().into_make_service();
                    let task = tokio::spawn(async move {
                        axum::serve(listener, service)
                            .with_graceful_shutdown(graceful)
                            .await
                    });
                    Site { name: path, local_addr: None, task }
                }
            };
            tracing::info!(site = %site.name, "Web service site started");
            self.sites.push(site);
        }

        tracing::debug!(sites = self.sites.len(), "Web service started successfully");
        Ok(())
    }

    /// Stop accepting, drain in-flight requests, then release all sites.
    pub async fn stop(&mut self) {
        if self.sites.is_empty() {
            return;
        }
        tracing::debug!("Stopping web service");
        self.shutdown.trigger();

        let timeout = self.config.shutdown_timeout();
        let sites = std::mem::take(&mut self.sites);
        join_all(sites.into_iter().map(|site| stop_site(site, timeout))).await;

        #[cfg(unix)]
        for path in &self.config.unix_paths {
            remove_socket_file(path);
        }
        tracing::debug!("Web service stopped successfully");
    }

    async fn bind_all(&self) -> Result<Vec<Bound>, ServiceError> {
        let mut bound = Vec::new();

        if let Some(port) = self.config.port {
            let hosts = if self.config.hosts.is_empty() {
                vec!["0.0.0.0".to_string()]
            } else {
                self.config.hosts.clone()
            };
            for host in &hosts {
                let addrs = tokio::net::lookup_host((host.as_str(), port))
                    .await
                    .map_err(|source| ServiceError::Resolve {
                        host: host.clone(),
                        source,
                    })?;
                let mut seen = Vec::new();
                for addr in addrs {
                    if seen.contains(&addr) {
                        continue;
                    }
                    seen.push(addr);
                    tracing::debug!(address = %addr, "Initializing TCP site");
                    bound.push(Bound::Tcp(self.bind_tcp(addr)?));
                }
            }
        }

        #[cfg(unix)]
        for path in &self.config.unix_paths {
            tracing::debug!(path = %path, "Initializing unix site");
            let listener = tokio::net::UnixListener::bind(path).map_err(|source| ServiceError::Bind {
                target: path.clone(),
                source,
            })?;
            bound.push(Bound::Unix(listener, path.clone()));
        }
        #[cfg(not(unix))]
        if !self.config.unix_paths.is_empty() {
            tracing::warn!("Unix socket sites are not supported on this platform");
        }

        Ok(bound)
    }

    fn bind_tcp(&self, addr: SocketAddr) -> Result<TcpListener, ServiceError> {
        let bind_err = |source| ServiceError::Bind {
            target: addr.to_string(),
            source,
        };
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        if let Some(reuse) = self.config.reuse_address {
            socket.set_reuseaddr(reuse).map_err(bind_err)?;
        }
        #[cfg(unix)]
        if let Some(reuse) = self.config.reuse_port {
            socket.set_reuseport(reuse).map_err(bind_err)?;
        }
        socket.bind(addr).map_err(bind_err)?;
        socket.listen(self.config.backlog).map_err(bind_err)
    }

    /// Router with the service-wide middleware stack.
    fn build_app(&self) -> Router {
        let trace = TraceLayer::new_for_http()
            .make_span_with(access_span)
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            );

        self.router
            .clone()
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID)))
            .layer(trace)
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static(X_REQUEST_ID),
                MakeRequestUuidV4,
            ))
    }
}

impl Drop for WebService {
    fn drop(&mut self) {
        for site in &self.sites {
            site.task.abort();
        }
    }
}

/// Span for the access log: caller, request line, user agent, request ID.
fn access_span(request: &Request<Body>) -> tracing::Span {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.to_string());

    tracing::info_span!(
        "request",
        remote = %remote,
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        user_agent = %header("user-agent"),
        request_id = %header(X_REQUEST_ID),
    )
}

/// Remove a unix socket file left behind by a stopped site.
#[cfg(unix)]
fn remove_socket_file(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %path, error = %e, "Failed to remove unix socket file");
        }
    }
}

async fn stop_site(mut site: Site, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut site.task).await {
        Ok(Ok(Ok(()))) => tracing::debug!(site = %site.name, "Site stopped"),
        Ok(Ok(Err(e))) => tracing::error!(site = %site.name, error = %e, "Site failed while serving"),
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => tracing::error!(site = %site.name, error = %e, "Site task panicked"),
        Err(_) => {
            tracing::warn!(site = %site.name, timeout = ?timeout, "Site did not drain in time, aborting");
            site.task.abort();
        }
    }
}
