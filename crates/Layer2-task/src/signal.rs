//! OS shutdown signals

use tracing::warn;

/// Resolves on Ctrl-C, or on SIGTERM/SIGQUIT where available
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let wait_for = |kind: SignalKind| async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Unable to listen for {:?}: {}", kind, e);
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = wait_for(SignalKind::terminate()) => {}
            _ = wait_for(SignalKind::quit()) => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
