//! Web service subsystem.
//!
//! # Data Flow
//! ```text
//! TCP / unix site (server.rs)
//!     → SetRequestId → TraceLayer access log → PropagateRequestId → body limit
//!     → Router<WebContext<C>> (application.rs)
//!     → WebRequest<C> extractor (request.rs: fresh controller, buffered body)
//!     → handler
//!     → make_response / Reply (response.rs) or WebError (error.rs)
//! ```
//!
//! # Design Decisions
//! - One controller per request, built by the application's factory
//! - Handler failures are typed and render as HTTP responses
//! - Every site shares a single middleware stack

pub mod application;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use application::{WebApplication, WebContext};
pub use error::WebError;
pub use request::{MakeRequestUuidV4, WebRequest, X_REQUEST_ID};
pub use response::{make_response, Reply};
pub use server::{ServiceError, WebService};
