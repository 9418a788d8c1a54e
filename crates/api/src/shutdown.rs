//! Process shutdown signal.

use std::future::Future;

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    wait_for(tokio::signal::ctrl_c()).await
}

/// Resolves once `signal` fires. If the handler could not be installed the
/// error is logged and this never resolves, leaving the server running.
pub async fn wait_for<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl-C; running until terminated");
            std::future::pending::<()>().await
        }
    }
}
