use std::sync::{Arc, OnceLock};
use tokio::signal;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{error, info};

/// Which signal asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Turns the first SIGINT or SIGTERM into a cancellation of the foreground
/// command and remembers which one it was for the exit code.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    received: Arc<OnceLock<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    /// Starts listening in the background. Must be called inside a runtime.
    pub fn install() -> Self {
        let coordinator = Self {
            cancel_token: CancellationToken::new(),
            received: Arc::new(OnceLock::new()),
        };

        let listener = coordinator.clone();
        tokio::spawn(async move {
            let received = wait_for_signal().await;
            match received {
                ShutdownSignal::Interrupt => info!("Received SIGINT (Ctrl+C), stopping"),
                ShutdownSignal::Terminate => info!("Received SIGTERM, stopping"),
            }
            listener.trigger(received);
        });

        coordinator
    }

    fn trigger(&self, received: ShutdownSignal) {
        let _ = self.received.set(received);
        self.cancel_token.cancel();
    }

    pub fn requested(&self) -> Option<ShutdownSignal> {
        self.received.get().copied()
    }

    /// Resolves once a signal has been received.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }
}

async fn wait_for_signal() -> ShutdownSignal {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}

/// Process exit codes; signal exits follow the shell's 128 + signo rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    Interrupted = 130,
    Terminated = 143,
}

impl ExitCode {
    pub fn from_signal(received: ShutdownSignal) -> Self {
        match received {
            ShutdownSignal::Interrupt => ExitCode::Interrupted,
            ShutdownSignal::Terminate => ExitCode::Terminated,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_signal_wins() {
        let coordinator = ShutdownCoordinator::install();
        assert_eq!(coordinator.requested(), None);

        coordinator.trigger(ShutdownSignal::Terminate);
        coordinator.trigger(ShutdownSignal::Interrupt);
        coordinator.cancelled().await;

        assert_eq!(coordinator.requested(), Some(ShutdownSignal::Terminate));
        assert_eq!(ExitCode::from_signal(ShutdownSignal::Terminate).as_i32(), 143);
        assert_eq!(ExitCode::from_signal(ShutdownSignal::Interrupt).as_i32(), 130);
    }
}
