use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::daemon::ServiceHandle;

/// Forwards SIGTERM/SIGINT as shutdown and SIGHUP as reload to the service
pub struct SignalHandler {
    handle: ServiceHandle,
}

impl SignalHandler {
    pub fn new(handle: ServiceHandle) -> Self {
        Self { handle }
    }

    /// Listen until a shutdown signal arrives or the service goes away
    pub async fn listen_for_signals(self) -> Result<()> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
        let signals_handle = signals.handle();

        info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!(
                        "Received shutdown signal ({}), initiating graceful shutdown",
                        signal
                    );
                    if let Err(e) = self.handle.shutdown() {
                        warn!("Failed to request shutdown: {:#}", e);
                    }
                    break;
                }
                SIGHUP => {
                    info!("Received SIGHUP signal, reloading");
                    if let Err(e) = self.handle.reload() {
                        warn!("Failed to request reload: {:#}", e);
                        break;
                    }
                }
                _ => {
                    warn!("Received unexpected signal: {}", signal);
                }
            }
        }

        signals_handle.close();
        Ok(())
    }
}
