//! ringserve — a single-threaded HTTP server on io_uring completions.
//!
//! One thread owns the completion interface. Accept, read, and write are
//! submitted as one-shot intents, each tagged with a generation-checked
//! request context; the event loop interprets completion records and
//! re-arms the next intent. Waiting for the next completion is the only
//! place the thread blocks, so no locking exists anywhere in the core.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ringserve::{Config, ResourceSet, Server, listener};
//!
//! fn main() -> Result<(), ringserve::Error> {
//!     let config = Config::default();
//!     let mut resources = ResourceSet::new();
//!     resources.insert("/index.html", "text/html", "<h1>hello</h1>");
//!
//!     let (listen_fd, addr) = listener::bind_listener(config.port, config.backlog)?;
//!     println!("listening on {addr}");
//!     Server::new(&config, listen_fd, resources)?.run()
//! }
//! ```
//!
//! # Platform
//!
//! Linux only; requires io_uring accept/recv/send opcodes (kernel 5.6+).

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod context;
pub(crate) mod driver;
pub(crate) mod metrics;
pub(crate) mod ring;
pub(crate) mod server;

// ── Public modules ──────────────────────────────────────────────────────
pub mod config;
pub mod error;
pub mod listener;
pub mod parser;
pub mod response;
pub mod signal;

// ── Re-exports ──────────────────────────────────────────────────────────

/// Runtime configuration.
pub use config::Config;
/// Builder for [`Config`] with `build()` validation.
pub use config::ConfigBuilder;
/// Kind of submitted intent, for diagnostics.
pub use context::OpKind;
/// Per-intent record interpreted on completion.
pub use context::RequestContext;
/// A decoded completion record.
pub use driver::Completion;
/// The completion queue driver.
pub use driver::Driver;
/// Handle for triggering shutdown.
pub use driver::ShutdownHandle;
/// Runtime errors.
pub use error::Error;
/// Bound on the request-line scan, in bytes.
pub use parser::MAX_REQUEST_LINE;
/// Request method after dispatch classification.
pub use parser::Method;
/// Request-line parse failures.
pub use parser::ParseError;
/// A parsed request line.
pub use parser::RequestLine;
/// Path-to-resource mapping served by the GET handler.
pub use response::ResourceSet;
/// The event loop and connection state machine.
pub use server::Server;
