//! BotDeck console - headless entry point.
//!
//! Connects to the bot server, tails the aggregated live feed to stdout,
//! and reports autosave outcomes until interrupted.

use anyhow::Result;
use botdeck::state::StateChange;
use botdeck::{APP_NAME, SaveNotice, Session, Settings, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let _log_guard = botdeck::logging::init(&settings.log_dir, settings.debug_mode)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let session = Session::start(&settings).await?;

    let mut feed_rx = session.feed.subscribe();
    let mut notice_rx = session.save_notices();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            change = feed_rx.recv() => match change {
                Ok(StateChange::LogsUpdated) => {
                    if let Some(line) = session.feed.read(|s| s.log_lines.back().cloned()) {
                        println!("{line}");
                    }
                }
                Ok(StateChange::ConnectionChanged { connected }) => {
                    tracing::info!(connected, "push channel state changed");
                }
                Ok(StateChange::RestartingChanged { restarting }) => {
                    tracing::info!(restarting, "server restart state changed");
                }
                Ok(StateChange::DbLogsUpdated) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("console tail lagged, dropped {n} updates");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            notice = notice_rx.recv() => {
                if let Ok(SaveNotice::Failed { reason }) = notice {
                    tracing::error!("autosave failed: {reason}");
                }
            }
        }
    }

    session.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
