use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `cancelation` once the process is asked to stop, by an interrupt or, on unix, a
/// termination signal.
///
/// On Windows detached processes can't detect signals sent to them, `stop` kills them instead.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received interrupt"),
                    _ = terminate.recv() => info!("Received termination signal"),
                };
            }
            Err(e) => {
                error!("Failed to listen for termination signals {e:?}");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received interrupt");
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(_) => info!("Received interrupt"),
            Err(e) => error!("Failed to listen for interrupts {e:?}"),
        }
    }
    cancelation.cancel();
}
