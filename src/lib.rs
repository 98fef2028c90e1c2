//! Async web toolkit: a self-recycling pooled HTTP client plus a small
//! web service layer with per-request controllers.

pub mod client;
pub mod config;
pub mod flat;
pub mod lifecycle;
pub mod observability;
pub mod web;

pub use client::{ClientError, ClientResponse, RequestOptions, WebClient};
pub use config::{AppConfig, ClientConfig, ServiceConfig};
pub use flat::{FlatMap, FlatValue};
pub use lifecycle::Shutdown;
pub use web::{make_response, WebApplication, WebError, WebRequest, WebService};
