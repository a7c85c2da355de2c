//! Request dispatch for the farm HTTP server.
//!
//! # Routes
//!
//! Matched in this order, first match wins:
//!
//! - `*    /info`                        — farm description merged over defaults
//! - `*    /status`                      — backend status, also stored for capacity checks
//! - `POST /call_shepard`                — run a Shepard query
//! - `*    /shepard/{id}`                — list the Behbbles of a Shepard
//! - `*    /behbble/{shepard}/{behbble}` — fetch one Behbble
//! - anything else                       — plain-text description page
//!
//! All routes go through a single axum fallback handler because matching is
//! by prefix with a fixed precedence, which path templates cannot express.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::FutureExt;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;

use super::capacity::{BackendStatus, CapacityTracker};
use super::config::FarmConfig;
use super::envelope::{Envelope, Reply};
use super::request::{BodyLimits, FarmRequest};
use super::router::Route;
use crate::backend::{
    Backend, BackendError, BackendResult, Behbble, CallOptions, ShepardReply, DEFAULT_DESCRIPTION,
    DEFAULT_NAME,
};
use crate::error::ErrorCode;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Backend every route delegates to.
    pub backend: Arc<dyn Backend>,
    /// Last status seen on `/status`.
    pub tracker: Arc<CapacityTracker>,
    pub config: Arc<FarmConfig>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, config: FarmConfig) -> Self {
        let tracker = CapacityTracker::new(BackendStatus::merged(config.initial_status.clone()));
        Self {
            backend,
            tracker: Arc::new(tracker),
            config: Arc::new(config),
        }
    }

    fn body_limits(&self) -> BodyLimits {
        BodyLimits {
            max_bytes: self.config.max_body_bytes,
            timeout: self.config.body_timeout(),
        }
    }
}

/// Build the axum router serving every farm route.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .fallback(farm_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn farm_handler(State(state): State<AppState>, request: Request) -> Response {
    let request = match FarmRequest::receive(request, state.body_limits()).await {
        Ok(request) => request,
        Err(err) => {
            tracing::error!("Failed to receive request: {}", err);
            return Envelope::error(ErrorCode::UnexpectedError, err.to_string()).into_response();
        }
    };

    dispatch(&state, &request).await.into_response()
}

/// Route a received request and produce its reply.
pub async fn dispatch(state: &AppState, request: &FarmRequest) -> Reply {
    let route = Route::resolve(&request.method, &request.path);
    tracing::debug!(
        route = route.name(),
        method = %request.method,
        path = %request.path,
        "Dispatching request"
    );

    match route {
        Route::Info => info_handler(state).await.into(),
        Route::Status => status_handler(state).await.into(),
        Route::CallShepard => call_shepard_handler(state, request).await.into(),
        Route::Shepard { shepard_id } => shepard_handler(state, shepard_id).await.into(),
        Route::Behbble {
            shepard_id,
            behbble_id,
        } => behbble_handler(state, shepard_id, behbble_id).await,
        Route::Fallback => description_page(state).await,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn info_handler(state: &AppState) -> Envelope {
    match guarded("info", state.backend.info()).await {
        Ok(fields) => Envelope::success(farm_info(fields)),
        Err(err) => failure("info", err),
    }
}

async fn status_handler(state: &AppState) -> Envelope {
    match guarded("status", state.backend.status()).await {
        Ok(fields) => {
            let status = BackendStatus::merged(fields);
            state.tracker.replace(status.clone());
            Envelope::success(status.into_fields())
        }
        Err(err) => failure("status", err),
    }
}

async fn call_shepard_handler(state: &AppState, request: &FarmRequest) -> Envelope {
    let Some(query) = request.body_field("query") else {
        return Envelope::error(
            ErrorCode::NoQueryProvided,
            "A Shepard Query could not be found",
        );
    };
    let query = truncate_query(query_text(query), state.config.query_limit());
    let options = CallOptions {
        is_choice: request.body_field("isChoice").is_some_and(is_truthy),
    };

    if state.config.reject_at_capacity && state.tracker.is_at_capacity() {
        return Envelope::error(ErrorCode::ReachedCapacity, "This farm has reached capacity");
    }

    match guarded("call_shepard", state.backend.call_shepard(&query, options)).await {
        Ok(Some(ShepardReply::Choices(choices))) => {
            Envelope::success_with("choices", Value::Array(choices))
        }
        Ok(Some(ShepardReply::Shepard(id))) => Envelope::success_with("shepard", id),
        Ok(None) => Envelope::error(ErrorCode::InvalidShepardQuery, "Invalid Shepard Query"),
        Err(err) => failure("call_shepard", err),
    }
}

async fn shepard_handler(state: &AppState, shepard_id: Option<&str>) -> Envelope {
    let Some(shepard_id) = shepard_id else {
        return invalid_shepard_id();
    };

    match guarded(
        "get_shepard_behbbles",
        state.backend.get_shepard_behbbles(shepard_id),
    )
    .await
    {
        Ok(Some(behbbles)) => Envelope::success_with("behbbles", Value::Array(behbbles)),
        Ok(None) => invalid_shepard_id(),
        Err(err) => failure("get_shepard_behbbles", err),
    }
}

async fn behbble_handler(
    state: &AppState,
    shepard_id: Option<&str>,
    behbble_id: Option<&str>,
) -> Reply {
    let Some(shepard_id) = shepard_id else {
        return invalid_shepard_id().into();
    };
    let Some(behbble_id) = behbble_id else {
        return Envelope::error(ErrorCode::InvalidBehbbleId, "Invalid Behbble ID").into();
    };

    match guarded(
        "get_behbble",
        state.backend.get_behbble(shepard_id, behbble_id),
    )
    .await
    {
        Ok(Some(Behbble::Json(behbble))) => Envelope::success_with("behbble", behbble).into(),
        Ok(Some(Behbble::Raw { content_type, body })) => Reply::Raw { content_type, body },
        Ok(None) => invalid_shepard_id().into(),
        Err(err) => failure("get_behbble", err).into(),
    }
}

/// Plain-text page for unrecognised paths. Falls back to the default
/// name and description when the backend cannot describe itself.
async fn description_page(state: &AppState) -> Reply {
    let fields = match guarded("info", state.backend.info()).await {
        Ok(fields) => fields,
        Err(err) => {
            tracing::warn!("Backend info failed, describing farm with defaults: {}", err);
            Map::new()
        }
    };
    let info = farm_info(fields);

    Reply::Text(format!(
        "This is a Behbble server!\n\nName: {}\nDescription: {}\n",
        display_field(&info, "name"),
        display_field(&info, "description"),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Await a backend call, turning a panic inside it into a failure.
async fn guarded<T, F>(operation: &'static str, call: F) -> BackendResult<T>
where
    F: Future<Output = BackendResult<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(BackendError::Failed(anyhow::anyhow!(
            "{} panicked: {}",
            operation,
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn failure(operation: &str, err: BackendError) -> Envelope {
    match &err {
        BackendError::Rejected { .. } => {
            tracing::debug!(operation, code = %err.code(), "Backend rejected request: {}", err)
        }
        BackendError::Failed(_) => {
            tracing::warn!(operation, "Backend call failed: {:#}", err)
        }
    }
    Envelope::from(err)
}

fn invalid_shepard_id() -> Envelope {
    Envelope::error(ErrorCode::InvalidShepardId, "Invalid Shepard ID")
}

/// `/info` defaults overlaid by the backend's fields.
fn farm_info(fields: Map<String, Value>) -> Map<String, Value> {
    let mut info = Map::new();
    info.insert("is_farm".to_string(), Value::Bool(true));
    info.insert("name".to_string(), Value::from(DEFAULT_NAME));
    info.insert("description".to_string(), Value::from(DEFAULT_DESCRIPTION));
    info.insert("version".to_string(), Value::from(crate::VERSION));
    info.extend(fields);
    info
}

fn display_field(info: &Map<String, Value>, key: &str) -> String {
    match info.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Text form of a query value, following JavaScript `String(value)`:
/// whole floats drop their fraction, arrays join their items with `,`
/// (null items become empty) and objects become `[object Object]`.
fn query_text(query: &Value) -> String {
    match query {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::String(text) => text.clone(),
        Value::Number(n) if n.is_f64() => n.as_f64().map(|f| f.to_string()).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => query_text(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Cut `query` to at most `limit` characters.
fn truncate_query(mut query: String, limit: usize) -> String {
    if let Some((cut, _)) = query.char_indices().nth(limit) {
        query.truncate(cut);
    }
    query
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
