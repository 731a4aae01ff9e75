//! WhereAreYou Client - Main Entry Point
//!
//! Headless host for the location reporter: restores or creates a session,
//! then reports the device position until interrupted.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use whereareyou_lib::{auth, config::Config, logging, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    info!("WhereAreYou client starting...");

    let config = Config::load().context("failed to load configuration")?;
    let mut state = AppState::new(&config).context("failed to initialise client")?;

    if !state.sessions.is_signed_in() {
        match (std::env::var("WRU_USER_ID"), std::env::var("WRU_PASSWORD")) {
            (Ok(user_id), Ok(password)) => {
                auth::sign_in(&state.api, &state.sessions, &user_id, &password)
                    .await
                    .context("sign-in failed")?;
            }
            _ => warn!("No stored session and no WRU_USER_ID/WRU_PASSWORD; reports will be rejected"),
        }
    }

    let shutdown = CancellationToken::new();
    state.reporter.start(&shutdown)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    state.reporter.stop().await?;
    Ok(())
}
