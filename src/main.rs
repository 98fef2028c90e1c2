//! asyncweb demo
//!
//! Starts a small web service with a per-request controller, then probes it
//! with the pooled client:
//!
//! ```text
//!   WebClient ── GET  /health ─────────────────▶ health()  → "OK <init_code>"
//!             ── POST /packet {i, r, resp} ────▶ packet()  → "OK <resp>"
//! ```
//!
//! With `--serve` the service keeps running until SIGINT/SIGTERM instead.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;

use asyncweb::client::{RequestOptions, WebClient};
use asyncweb::config::{load_config, AppConfig};
use asyncweb::lifecycle::shutdown_signal;
use asyncweb::observability::logging;
use asyncweb::web::{make_response, WebApplication, WebError, WebRequest, WebService};

#[derive(Parser)]
#[command(name = "asyncweb")]
#[command(about = "Demo web service probed by the pooled web client", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep serving until interrupted instead of running the self-check
    #[arg(long)]
    serve: bool,
}

struct Controller {
    init_code: u32,
}

#[derive(Debug, Deserialize)]
struct Probe {
    /// Is the web service healthy?
    #[serde(rename = "i")]
    is_healthy: bool,
    #[serde(rename = "r")]
    req: String,
    #[serde(rename = "resp")]
    reply_id: i64,
}

async fn health(request: WebRequest<Controller>) -> Response {
    let ip = request.remote().unwrap_or_default();
    tracing::info!(ip = %ip, "health ok");
    make_response(
        format!("OK {}", request.controller().init_code),
        StatusCode::OK,
        None,
    )
}

async fn packet(request: WebRequest<Controller>) -> Result<Response, WebError> {
    let ip = request.remote().unwrap_or_default();
    let data: Probe = request.json_body()?;
    tracing::info!(
        ip = %ip,
        is_healthy = data.is_healthy,
        req = %data.req,
        reply_id = data.reply_id,
        "Requesting"
    );
    Ok(make_response(format!("OK {}", data.reply_id), StatusCode::OK, None))
}

fn probe_base(addr: SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        addr.ip().to_string()
    };
    if addr.is_ipv6() && !addr.ip().is_unspecified() {
        format!("http://[{}]:{}", host, addr.port())
    } else {
        format!("http://{}:{}", host, addr.port())
    }
}

async fn self_check(config: &AppConfig, base: &str) {
    let client = WebClient::new(config.client.clone());

    match client.get(&format!("{base}/health"), RequestOptions::new()).await {
        Ok(result) if result.text() == "OK 10" => tracing::info!("GET request healthy"),
        Ok(result) => tracing::error!(status = result.status(), body = %result.text(), "NOT HEALTHY"),
        Err(e) => tracing::error!(error = %e, "NOT HEALTHY"),
    }

    let body = json!({"i": true, "r": "Are you ok?", "resp": 8});
    match client
        .post(&format!("{base}/packet"), RequestOptions::new().json_value(body))
        .await
    {
        Ok(result) if result.text() == "OK 8" => tracing::info!("POST request healthy"),
        Ok(result) => tracing::error!(status = result.status(), body = %result.text(), "NOT HEALTHY"),
        Err(e) => tracing::error!(error = %e, "NOT HEALTHY"),
    }

    client.close(true).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "asyncweb starting");

    let router = WebApplication::new(|| Controller { init_code: 10 })
        .route("/health", get(health))
        .route("/packet", post(packet))
        .into_router();

    let mut service = WebService::new(config.service.clone(), router);
    service.start().await?;
    tracing::info!(addresses = ?service.local_addrs(), "Started example web server");

    if cli.serve {
        shutdown_signal().await;
    } else if let Some(addr) = service.local_addrs().first().copied() {
        self_check(&config, &probe_base(addr)).await;
    } else {
        tracing::warn!("No TCP site configured, skipping self-check");
    }

    service.stop().await;
    tracing::info!("Stopped example web server");
    Ok(())
}
