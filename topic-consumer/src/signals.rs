use log::info;
use tokio_util::sync::CancellationToken;

/// SIGINT and SIGTERM listeners. Registered on construction, so a signal
/// arriving before anyone awaits [`ShutdownSignals::recv`] is still caught.
#[cfg(unix)]
pub struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves with the name of the first shutdown signal received.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "ctrl-c"
    }
}

/// Cancels `shutdown` once a signal arrives. Closing readers is left to
/// whoever waits on the token.
pub async fn cancel_on_signal(mut signals: ShutdownSignals, shutdown: CancellationToken) {
    let name = signals.recv().await;
    info!("Received {name}");
    shutdown.cancel();
}
