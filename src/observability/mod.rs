//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client::session  → session open/close/idle events
//! client (executor) → per-request debug events, failures
//! web::server       → access log spans (remote, request line, request id)
//!     → logging.rs subscriber → stdout (text or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured fields everywhere, never preformatted strings
//! - Request ID flows from the access span into handlers via `x-request-id`

pub mod logging;
