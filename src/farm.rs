//! The farm server: configuration, backend and status tracker in one place.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::backend::{Backend, BackendResult, DefaultBackend, RemoteBackend};
use crate::error::FarmError;
use crate::server::{app_router, AppState, BackendStatus, FarmConfig};

/// A farm ready to serve.
#[derive(Clone)]
pub struct Farm {
    state: AppState,
}

impl Farm {
    pub fn new<B>(backend: B, config: FarmConfig) -> Self
    where
        B: Backend + 'static,
    {
        Self::with_backend(Arc::new(backend), config)
    }

    pub fn with_backend(backend: Arc<dyn Backend>, config: FarmConfig) -> Self {
        Self {
            state: AppState::new(backend, config),
        }
    }

    /// A farm forwarding to `config.upstream` when set, otherwise an empty one.
    pub fn from_config(config: FarmConfig) -> Result<Self, FarmError> {
        let backend: Arc<dyn Backend> = match config.upstream.as_deref() {
            Some(url) => Arc::new(RemoteBackend::new(url).map_err(FarmError::Upstream)?),
            None => Arc::new(DefaultBackend),
        };
        Ok(Self::with_backend(backend, config))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &FarmConfig {
        &self.state.config
    }

    /// Get the router (for testing)
    pub fn router(&self) -> Router {
        app_router(self.state.clone())
    }

    pub fn is_at_capacity(&self) -> bool {
        self.state.tracker.is_at_capacity()
    }

    /// Last status seen on `/status`.
    pub fn last_status(&self) -> BackendStatus {
        self.state.tracker.snapshot()
    }

    /// Ask the backend for its status and store it.
    pub async fn refresh_status(&self) -> BackendResult<BackendStatus> {
        let status = BackendStatus::merged(self.state.backend.status().await?);
        self.state.tracker.replace(status.clone());
        Ok(status)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, FarmError> {
        let addr_text = self.config().socket_addr();
        let addr: SocketAddr = addr_text
            .parse()
            .map_err(|source| FarmError::InvalidAddress {
                addr: addr_text.clone(),
                source,
            })?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Bind the configured address and serve until the process ends.
    pub async fn serve(self) -> Result<(), FarmError> {
        let listener = self.bind().await?;
        self.serve_on(listener, std::future::pending()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// The backend status is fetched once before the first request; a failure
    /// there is logged and the configured initial status is kept.
    pub async fn serve_on<S>(self, listener: TcpListener, shutdown: S) -> Result<(), FarmError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        match self.refresh_status().await {
            Ok(status) => tracing::debug!(capacity = status.capacity(), "Initial backend status"),
            Err(err) => tracing::warn!("Initial status refresh failed: {}", err.description()),
        }

        let addr = listener.local_addr()?;
        tracing::info!("Farm listening on {}", addr);
        tracing::info!("Routes: /info /status /call_shepard /shepard/{{id}} /behbble/{{shepard}}/{{behbble}}");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Farm on {} stopped", addr);
        Ok(())
    }
}
