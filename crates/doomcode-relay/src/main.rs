//! doomcode-relay: the stateless rendezvous server.
//!
//! Single Tokio process serving HTTP session bootstrap and the duplex
//! WebSocket transport from the same listener (§6).

use std::time::Duration;

use doomcode_relay::{http, AppState, RelayConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("doomcode_relay=info".parse()?),
        )
        .init();

    info!("doomcode relay starting");

    let config = RelayConfig::load();
    let state = AppState::new();

    let sweep_state = state.clone();
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweep_state.store.sweep_expired(chrono::Utc::now());
        }
    });

    let router = http::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|source| doomcode_relay::RelayError::Bind {
            addr: config.listen_addr.clone(),
            source,
        })?;

    info!(addr = %config.listen_addr, "listening");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                error!("server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
        }
    }

    sweeper.abort();
    info!("relay stopped");
    Ok(())
}
