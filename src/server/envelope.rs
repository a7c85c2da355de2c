//! Response envelopes.
//!
//! Every JSON reply is one of two shapes:
//!
//! - success: `{"success": true, ...payload}`
//! - error:   `{"err": "<message>", "code": <ErrorCode>}`
//!
//! Errors are sent with HTTP 200 like everything else; clients branch on
//! `code`, never on the status line.

use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::backend::BackendError;
use crate::error::ErrorCode;

/// A JSON reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Map<String, Value>),
    Error { err: String, code: ErrorCode },
}

impl Envelope {
    pub fn success(payload: Map<String, Value>) -> Self {
        Envelope::Success(payload)
    }

    /// Success with a single payload field.
    pub fn success_with(key: &str, value: Value) -> Self {
        let mut payload = Map::new();
        payload.insert(key.to_string(), value);
        Envelope::Success(payload)
    }

    pub fn error(code: ErrorCode, err: impl Into<String>) -> Self {
        Envelope::Error {
            err: err.into(),
            code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Envelope::Success(_) => None,
            Envelope::Error { code, .. } => Some(*code),
        }
    }
}

impl From<BackendError> for Envelope {
    fn from(err: BackendError) -> Self {
        Envelope::error(err.code(), err.description())
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Envelope::Success(payload) => {
                // An `err` key would make the object look like an error.
                let fields: Vec<_> = payload
                    .iter()
                    .filter(|(key, _)| key.as_str() != "success" && key.as_str() != "err")
                    .collect();
                let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
                map.serialize_entry("success", &true)?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Envelope::Error { err, code } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("err", err)?;
                map.serialize_entry("code", code)?;
                map.end()
            }
        }
    }
}

/// Anything a route handler can answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Envelope(Envelope),
    /// Bytes produced by the backend, written as-is.
    Raw { content_type: String, body: Bytes },
    /// The plain-text description page.
    Text(String),
}

impl From<Envelope> for Reply {
    fn from(envelope: Envelope) -> Self {
        Reply::Envelope(envelope)
    }
}

const CORS_HEADERS: [(&str, &str); 4] = [
    ("access-control-allow-origin", "*"),
    ("access-control-request-method", "*"),
    ("access-control-allow-methods", "GET, POST"),
    ("access-control-allow-headers", "*"),
];

fn with_headers(content_type: HeaderValue, body: impl Into<axum::body::Body>) -> Response {
    let mut response = Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    for (name, value) in CORS_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let body = match serde_json::to_vec(&self) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("Failed to serialize envelope: {}", err);
                br#"{"err":"Failed to serialize response","code":1}"#.to_vec()
            }
        };
        with_headers(HeaderValue::from_static("application/json"), body)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Envelope(envelope) => envelope.into_response(),
            Reply::Raw { content_type, body } => {
                let content_type = HeaderValue::from_str(&content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
                with_headers(content_type, body)
            }
            Reply::Text(text) => with_headers(HeaderValue::from_static("text/plain"), text),
        }
    }
}
