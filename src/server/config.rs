//! Farm configuration.
//!
//! Values come from code (`FarmConfig::default()` plus the `with_*` helpers),
//! from a serialized document, or from the environment via
//! [`FarmConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default maximum Shepard query length, in characters.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 256;

/// Farm server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Queries are cut to this many characters before reaching the backend.
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// Largest request body that will be buffered (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Time allowed for receiving a request body (default: 30s)
    #[serde(default = "default_body_timeout_ms")]
    pub body_timeout_ms: u64,

    /// Status the capacity tracker starts with, merged over `{capacity: 0}`.
    #[serde(default)]
    pub initial_status: Map<String, Value>,

    /// Answer `/call_shepard` with `REACHED_CAPACITY` while at capacity.
    #[serde(default)]
    pub reject_at_capacity: bool,

    /// Base URL of an upstream farm to forward to, if any.
    #[serde(default)]
    pub upstream: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_query_length() -> usize {
    DEFAULT_MAX_QUERY_LENGTH
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_body_timeout_ms() -> u64 {
    30_000
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_query_length: default_max_query_length(),
            max_body_bytes: default_max_body_bytes(),
            body_timeout_ms: default_body_timeout_ms(),
            initial_status: Map::new(),
            reject_at_capacity: false,
            upstream: None,
        }
    }
}

impl FarmConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the query length bound. Zero keeps the default.
    pub fn max_query_length(mut self, length: usize) -> Self {
        self.max_query_length = if length == 0 {
            DEFAULT_MAX_QUERY_LENGTH
        } else {
            length
        };
        self
    }

    pub fn initial_status(mut self, status: Map<String, Value>) -> Self {
        self.initial_status = status;
        self
    }

    pub fn reject_at_capacity(mut self, reject: bool) -> Self {
        self.reject_at_capacity = reject;
        self
    }

    /// Query length bound actually applied.
    pub fn query_limit(&self) -> usize {
        if self.max_query_length == 0 {
            DEFAULT_MAX_QUERY_LENGTH
        } else {
            self.max_query_length
        }
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build a config from the process environment.
    ///
    /// Recognised variables: `FARM_HOST`, `PORT`, `FARM_MAX_QUERY_LENGTH`,
    /// `FARM_MAX_BODY_BYTES`, `FARM_BODY_TIMEOUT_MS`, `FARM_INITIAL_STATUS`
    /// (a JSON object), `FARM_REJECT_AT_CAPACITY` and `FARM_UPSTREAM`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparsable values are
    /// logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("FARM_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PORT") {
            config.port = port;
        }
        if let Some(length) = parse_var::<usize, _>(&lookup, "FARM_MAX_QUERY_LENGTH") {
            config = config.max_query_length(length);
        }
        if let Some(bytes) = parse_var(&lookup, "FARM_MAX_BODY_BYTES") {
            config.max_body_bytes = bytes;
        }
        if let Some(ms) = parse_var(&lookup, "FARM_BODY_TIMEOUT_MS") {
            config.body_timeout_ms = ms;
        }
        if let Some(raw) = lookup("FARM_INITIAL_STATUS") {
            match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(status)) => config.initial_status = status,
                _ => tracing::warn!(
                    "FARM_INITIAL_STATUS is not a JSON object, starting with empty status"
                ),
            }
        }
        if let Some(reject) = parse_var(&lookup, "FARM_REJECT_AT_CAPACITY") {
            config.reject_at_capacity = reject;
        }
        config.upstream = lookup("FARM_UPSTREAM").filter(|url| !url.trim().is_empty());

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
