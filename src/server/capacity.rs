//! Last known backend status.
//!
//! The tracker is a single-writer cell: every write replaces the whole
//! status and readers only ever see complete snapshots. Concurrent writers
//! race, and the last replacement wins.

use serde_json::{Map, Value};
use tokio::sync::watch;

/// Status reported by a backend: `{capacity: number, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendStatus(Map<String, Value>);

impl BackendStatus {
    /// Merge `fields` over the `{capacity: 0}` default.
    pub fn merged(fields: Map<String, Value>) -> Self {
        let mut status = Map::new();
        status.insert("capacity".to_string(), Value::from(0));
        status.extend(fields);
        Self(status)
    }

    /// Numeric capacity. Numeric strings count; anything else is 0.
    pub fn capacity(&self) -> f64 {
        match self.0.get("capacity") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            Some(Value::Bool(true)) => 1.0,
            _ => 0.0,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl Default for BackendStatus {
    fn default() -> Self {
        Self::merged(Map::new())
    }
}

/// Holds the most recent [`BackendStatus`].
#[derive(Debug)]
pub struct CapacityTracker {
    current: watch::Sender<BackendStatus>,
}

impl CapacityTracker {
    pub fn new(initial: BackendStatus) -> Self {
        let (current, _) = watch::channel(initial);
        Self { current }
    }

    /// Replace the tracked status, returning the previous one.
    pub fn replace(&self, status: BackendStatus) -> BackendStatus {
        self.current.send_replace(status)
    }

    pub fn snapshot(&self) -> BackendStatus {
        self.current.borrow().clone()
    }

    /// Receiver notified on every replacement.
    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.current.subscribe()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.current.borrow().capacity() >= 1.0
    }
}

impl Default for CapacityTracker {
    fn default() -> Self {
        Self::new(BackendStatus::default())
    }
}
