//! Signal handling for graceful shutdown.

use anyhow::{Context, Result};
use tracing::info;

/// Wait until SIGTERM or SIGINT arrives.
///
/// # Errors
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = terminate.recv() => info!("Received SIGTERM"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            info!("Received SIGINT");
        }
    }

    Ok(())
}

/// Wait until Ctrl+C arrives.
///
/// # Errors
/// Returns an error if the Ctrl+C handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_signal_keeps_waiting() {
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_for_shutdown()).await;
        assert!(waited.is_err());
    }
}
