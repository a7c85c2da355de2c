//! The backend contract a farm delegates to.
//!
//! A farm only routes and validates; what a Shepard computes and what a
//! Behbble contains is decided by a [`Backend`] implementation. Every method
//! has a default body, so an implementation only overrides what it serves.
//!
//! # Implementations
//!
//! - [`DefaultBackend`] — uses the defaults only (an empty farm)
//! - [`remote::RemoteBackend`] — forwards every call to an upstream farm

pub mod remote;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ErrorCode;

pub use remote::RemoteBackend;

/// Default farm name reported by `/info`.
pub const DEFAULT_NAME: &str = "Untitled Farm";

/// Default farm description reported by `/info`.
pub const DEFAULT_DESCRIPTION: &str = "A quiet farm...";

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a backend operation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend understood the request and refused it.
    ///
    /// Forwarded to the caller with `code`, or `CUSTOM_ERROR` when absent.
    #[error("{message}")]
    Rejected {
        message: String,
        code: Option<ErrorCode>,
    },

    /// The backend call itself failed. Reported as `UNEXPECTED_ERROR`.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl BackendError {
    /// A rejection without a code of its own.
    pub fn rejected(message: impl Into<String>) -> Self {
        BackendError::Rejected {
            message: message.into(),
            code: None,
        }
    }

    /// A rejection carrying a specific code.
    pub fn rejected_with(message: impl Into<String>, code: ErrorCode) -> Self {
        BackendError::Rejected {
            message: message.into(),
            code: Some(code),
        }
    }

    /// The code this error is reported under.
    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::Rejected { code, .. } => code.unwrap_or(ErrorCode::CustomError),
            BackendError::Failed(_) => ErrorCode::UnexpectedError,
        }
    }

    /// Human-readable description, including the source chain for failures.
    pub fn description(&self) -> String {
        match self {
            BackendError::Rejected { message, .. } => message.clone(),
            BackendError::Failed(err) => format!("{err:#}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Call types
// ---------------------------------------------------------------------------

/// Options passed along with a Shepard query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// The caller is picking among previously offered choices.
    pub is_choice: bool,
}

/// Successful answer to a Shepard query.
#[derive(Debug, Clone, PartialEq)]
pub enum ShepardReply {
    /// Candidate Shepards to choose from (query mode).
    Choices(Vec<Value>),
    /// The identifier of the Shepard that was called (direct-call mode).
    Shepard(Value),
}

/// A Behbble as returned by [`Backend::get_behbble`].
#[derive(Debug, Clone, PartialEq)]
pub enum Behbble {
    /// Wrapped by the dispatcher as `{success: true, behbble: ...}`.
    Json(Value),
    /// Written to the client verbatim.
    Raw { content_type: String, body: Bytes },
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Operations a farm delegates to its backend.
///
/// `Ok(None)` from the lookup operations means the backend produced nothing;
/// the dispatcher reports it as an invalid identifier or query. Backends that
/// can tell "does not exist" apart should reject with
/// [`ErrorCode::ShepardNotFound`] instead.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Descriptive fields merged over the farm's `/info` defaults.
    async fn info(&self) -> BackendResult<Map<String, Value>> {
        let mut info = Map::new();
        info.insert("name".to_string(), Value::from(DEFAULT_NAME));
        info.insert("description".to_string(), Value::from(DEFAULT_DESCRIPTION));
        Ok(info)
    }

    /// Current status, merged over `{capacity: 0}`.
    async fn status(&self) -> BackendResult<Map<String, Value>> {
        let mut status = Map::new();
        status.insert("capacity".to_string(), Value::from(0));
        Ok(status)
    }

    /// Run a (possibly truncated) Shepard query.
    async fn call_shepard(
        &self,
        _query: &str,
        _options: CallOptions,
    ) -> BackendResult<Option<ShepardReply>> {
        Ok(Some(ShepardReply::Shepard(Value::Null)))
    }

    /// List the Behbbles of a Shepard.
    async fn get_shepard_behbbles(&self, _shepard_id: &str) -> BackendResult<Option<Vec<Value>>> {
        Ok(Some(Vec::new()))
    }

    /// Fetch a single Behbble.
    async fn get_behbble(
        &self,
        _shepard_id: &str,
        _behbble_id: &str,
    ) -> BackendResult<Option<Behbble>> {
        Ok(None)
    }
}

/// A backend with no Shepards of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

#[async_trait]
impl Backend for DefaultBackend {}
