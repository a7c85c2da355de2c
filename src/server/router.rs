//! Route resolution.
//!
//! Routes are matched on the request path in a fixed order; the first match
//! wins. `/shepard` and `/behbble` match by prefix, so `/shepards/x` is a
//! Shepard lookup too. Path segments are used as they appear on the wire,
//! without percent-decoding.

use axum::http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Info,
    Status,
    CallShepard,
    Shepard {
        shepard_id: Option<&'a str>,
    },
    Behbble {
        shepard_id: Option<&'a str>,
        behbble_id: Option<&'a str>,
    },
    /// The plain-text description page.
    Fallback,
}

impl<'a> Route<'a> {
    pub fn resolve(method: &Method, path: &'a str) -> Self {
        if path == "/info" {
            Route::Info
        } else if path == "/status" {
            Route::Status
        } else if path == "/call_shepard" && *method == Method::POST {
            Route::CallShepard
        } else if path.starts_with("/shepard") {
            Route::Shepard {
                shepard_id: segment(path, 2),
            }
        } else if path.starts_with("/behbble") {
            Route::Behbble {
                shepard_id: segment(path, 2),
                behbble_id: segment(path, 3),
            }
        } else {
            Route::Fallback
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Info => "info",
            Route::Status => "status",
            Route::CallShepard => "call_shepard",
            Route::Shepard { .. } => "shepard",
            Route::Behbble { .. } => "behbble",
            Route::Fallback => "fallback",
        }
    }
}

/// The `index`-th `/`-separated segment, counting the empty segment before
/// the leading slash as 0. Empty segments count as missing.
fn segment(path: &str, index: usize) -> Option<&str> {
    path.split('/').nth(index).filter(|s| !s.is_empty())
}
