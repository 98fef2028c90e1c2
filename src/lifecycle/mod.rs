//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal() resolves
//!
//! Shutdown (shutdown.rs):
//!     WebService::stop → Shutdown::trigger → every site stops accepting
//!     → in-flight requests drain → sites past the deadline are aborted
//! ```
//!
//! # Design Decisions
//! - One broadcast fans out to every site
//! - Shutdown has a timeout: forced abort after the deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
