//! One-shot shutdown signal raised by the stop endpoint or an OS signal.

use postwatch_core::TeardownReport;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// `/api/stop` tore the channels down.
    Teardown(TeardownReport),
    /// Ctrl-C or SIGTERM; channels are still open.
    Signal,
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// First trigger wins; later ones are ignored.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => None,
        };
        reason.unwrap_or(ShutdownReason::Signal)
    }
}

/// Resolves on Ctrl-C or SIGTERM, or when `signal` is triggered elsewhere.
pub async fn wait_for_shutdown(signal: ShutdownSignal) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received ctrl-c");
            signal.trigger(ShutdownReason::Signal);
        }
        _ = terminate => {
            info!("received SIGTERM");
            signal.trigger(ShutdownReason::Signal);
        }
        _ = signal.wait() => {}
    }
}
