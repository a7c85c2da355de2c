//! HTTP layer of the farm.
//!
//! # Endpoints
//!
//! - `/info`                         — farm description
//! - `/status`                       — backend status (also cached for capacity checks)
//! - `POST /call_shepard`            — run a Shepard query
//! - `/shepard/{id}`                 — Behbbles of a Shepard
//! - `/behbble/{shepard}/{behbble}`  — a single Behbble
//!
//! Any other path gets a plain-text description page.

pub mod capacity;
pub mod config;
pub mod envelope;
pub mod request;
pub mod router;
pub mod routes;

pub use capacity::{BackendStatus, CapacityTracker};
pub use config::FarmConfig;
pub use envelope::{Envelope, Reply};
pub use request::{FarmRequest, RequestError};
pub use routes::{app_router, dispatch, AppState};
