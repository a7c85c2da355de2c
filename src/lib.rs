//! # Farm
//!
//! A small HTTP server that answers a fixed set of routes by delegating to a
//! pluggable [`Backend`]: Shepards are looked up by ID or queried with free
//! text, and Behbbles are the artifacts they produce.
//!
//! The crate owns routing, request parsing, validation and the JSON envelope
//! (`{success: true, ...}` or `{err, code}`). What a Shepard actually does is
//! up to the backend.
//!
//! ```no_run
//! use farm::{DefaultBackend, Farm, FarmConfig};
//!
//! # async fn run() -> Result<(), farm::FarmError> {
//! Farm::new(DefaultBackend, FarmConfig::with_port(8080)).serve().await
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod farm;
pub mod server;

pub use backend::{
    Backend, BackendError, BackendResult, Behbble, CallOptions, DefaultBackend, RemoteBackend,
    ShepardReply,
};
pub use error::{ErrorCode, FarmError};
pub use farm::Farm;
pub use server::{Envelope, FarmConfig};

/// Version reported by `/info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
