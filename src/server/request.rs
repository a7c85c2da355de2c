//! Request parsing.
//!
//! The whole body is buffered before dispatch. Non-empty bodies are parsed as
//! JSON; a body that is not valid JSON becomes `None` rather than failing the
//! request. Only transport failures (a broken stream, an oversized body, a
//! body that does not arrive in time) are errors.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, Method};
use serde_json::Value;
use thiserror::Error;

/// Bounds applied while buffering a request body.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

/// Transport-level failure while receiving a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request body of {length} bytes exceeds the limit of {limit} bytes")]
    TooLarge { length: u64, limit: usize },

    #[error("Timed out after {0:?} waiting for the request body")]
    Timeout(Duration),

    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),
}

/// A fully received request.
#[derive(Debug, Clone)]
pub struct FarmRequest {
    /// Header names are lower-case; repeated headers are joined with ", ".
    pub headers: HashMap<String, String>,
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub body: Option<Value>,
}

impl FarmRequest {
    pub async fn receive(request: Request, limits: BodyLimits) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();

        if let Some(length) = declared_length(&parts.headers) {
            if length > limits.max_bytes as u64 {
                return Err(RequestError::TooLarge {
                    length,
                    limit: limits.max_bytes,
                });
            }
        }

        let bytes = tokio::time::timeout(
            limits.timeout,
            axum::body::to_bytes(body, limits.max_bytes),
        )
        .await
        .map_err(|_| RequestError::Timeout(limits.timeout))??;

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in parts.headers.iter() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Ok(Self {
            headers,
            method: parts.method,
            path: parts.uri.path().to_string(),
            body: parse_body(&bytes),
        })
    }

    /// A field of the JSON body, if the body is an object that has it.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref()?.as_object()?.get(key)
    }
}

fn declared_length(headers: &axum::http::HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Lenient JSON parse: empty or malformed input yields `None`.
pub fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}
