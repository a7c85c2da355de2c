//! Farm HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `FARM_HOST` — bind address (default: 0.0.0.0)
//! - `FARM_MAX_QUERY_LENGTH` — Shepard query truncation bound (default: 256)
//! - `FARM_MAX_BODY_BYTES` / `FARM_BODY_TIMEOUT_MS` — request body limits
//! - `FARM_INITIAL_STATUS` — JSON object the status cache starts with
//! - `FARM_REJECT_AT_CAPACITY` — refuse `/call_shepard` while at capacity
//! - `FARM_UPSTREAM` — forward every call to the farm at this URL
//! - `RUST_LOG` — Tracing filter (default: "info,farm=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin farm
//! # or in front of another farm:
//! FARM_UPSTREAM=http://10.0.0.2:8080 cargo run --bin farm
//! ```

use anyhow::Context;
use farm::{Farm, FarmConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,farm=debug".into()),
        )
        .init();

    let config = FarmConfig::from_env();
    match config.upstream.as_deref() {
        Some(upstream) => tracing::info!("Forwarding to upstream farm at {}", upstream),
        None => tracing::info!("No upstream configured, serving an empty farm"),
    }

    let farm = Farm::from_config(config)?;
    let listener = farm
        .bind()
        .await
        .with_context(|| format!("Failed to bind {}", farm.config().socket_addr()))?;

    farm.serve_on(listener, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
